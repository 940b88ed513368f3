//! The PDL text frontend: a recursive-descent parser that fills a [`Task`]
//! with the type hierarchy, the schematic variables, the CPF and constraint
//! definitions of a domain file, and the bindings of an instance file.
//!
//! The expression grammar, loosest first: `|`, `^`/`&`, `~`, comparisons,
//! `+`/`-`, `*`/`/`. Quantified subformulas take a bracketed body, and
//! `KronDelta(e)` is the identity on `e`.

pub mod lexer;

use crate::error::{CompileError, Result};
use crate::logic::{Expr, Expression, QuantifierKind};
use crate::task::{ground_name, Task, VariableKind, VariableSchema};

use lexer::{PosToken, Token};

pub fn parse_domain(text: &str, task: &mut Task) -> Result<()> {
    Parser::new(text)?.domain(task)
}

pub fn parse_instance(text: &str, task: &mut Task) -> Result<()> {
    Parser::new(text)?.instance(task)
}

struct Parser {
    tokens: Vec<PosToken>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        Ok(Self {
            tokens: lexer::tokenize(text)?,
            pos: 0,
        })
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let (line, column) = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        CompileError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|t| t.token.clone())
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            self.pos -= 1;
            Err(self.error(format!("expected {:?}, found {:?}", expected, token)))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            token => {
                self.pos -= 1;
                Err(self.error(format!("expected a name, found {:?}", token)))
            }
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let name = self.expect_ident()?;
        if name == keyword {
            Ok(())
        } else {
            self.pos -= 1;
            Err(self.error(format!("expected '{}', found '{}'", keyword, name)))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_number(&mut self) -> Result<f64> {
        match self.next()? {
            Token::Number(value) => Ok(value),
            token => {
                self.pos -= 1;
                Err(self.error(format!("expected a number, found {:?}", token)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Domain file
    // ------------------------------------------------------------------

    fn domain(&mut self, task: &mut Task) -> Result<()> {
        self.expect_keyword("domain")?;
        task.domain_name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        while !self.eat(&Token::RBrace) {
            let section = self.expect_ident()?;
            match section.as_str() {
                "types" => self.types_section(task)?,
                "pvariables" => self.pvariables_section(task)?,
                "cpfs" => self.cpfs_section(task)?,
                "reward" => {
                    self.expect(Token::Assign)?;
                    let formula = self.expression(task)?;
                    task.set_reward_definition(formula)?;
                    self.expect(Token::Semicolon)?;
                }
                "constraints" | "action-preconditions" | "state-action-constraints" => {
                    self.expect(Token::LBrace)?;
                    while !self.eat(&Token::RBrace) {
                        let constraint = self.expression(task)?;
                        task.constraint_definitions.push(constraint);
                        self.expect(Token::Semicolon)?;
                    }
                }
                other => return Err(self.error(format!("unknown domain section '{}'", other))),
            }
        }
        Ok(())
    }

    fn types_section(&mut self, task: &mut Task) -> Result<()> {
        self.expect(Token::LBrace)?;
        while !self.eat(&Token::RBrace) {
            let name = self.expect_ident()?;
            if self.eat(&Token::Colon) {
                if self.eat(&Token::LBrace) {
                    // An enumerated type; its values are objects.
                    task.add_type(&name, None)?;
                    loop {
                        match self.next()? {
                            Token::EnumLiteral(value) => {
                                task.add_object(&name, &value)?;
                            }
                            token => {
                                self.pos -= 1;
                                return Err(self.error(format!(
                                    "expected an enum value, found {:?}",
                                    token
                                )));
                            }
                        }
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RBrace)?;
                } else {
                    let supertype = self.expect_ident()?;
                    task.add_type(&name, Some(&supertype))?;
                }
            } else {
                task.add_type(&name, Some("object"))?;
            }
            self.expect(Token::Semicolon)?;
        }
        Ok(())
    }

    fn pvariables_section(&mut self, task: &mut Task) -> Result<()> {
        self.expect(Token::LBrace)?;
        while !self.eat(&Token::RBrace) {
            let name = self.expect_ident()?;
            let mut param_types = Vec::new();
            if self.eat(&Token::LParen) {
                loop {
                    let type_name = self.expect_ident()?;
                    param_types.push(task.type_id(&type_name)?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
            }
            self.expect(Token::Colon)?;
            self.expect(Token::LBrace)?;
            let kind = match self.expect_ident()?.as_str() {
                "state-fluent" => VariableKind::StateFluent,
                "action-fluent" => VariableKind::ActionFluent,
                "non-fluent" => VariableKind::NonFluent,
                "interm-fluent" => VariableKind::IntermFluent,
                other => {
                    return Err(self.error(format!("unknown variable kind '{}'", other)))
                }
            };
            self.expect(Token::Comma)?;
            let value_type_name = self.expect_ident()?;
            let value_type = task.type_id(&value_type_name)?;
            self.expect(Token::Comma)?;
            self.expect_keyword("default")?;
            self.expect(Token::Assign)?;
            let default_value = self.value(task)?;
            self.expect(Token::RBrace)?;
            self.expect(Token::Semicolon)?;

            task.add_schema(VariableSchema {
                name,
                param_types,
                kind,
                value_type,
                default_value,
            })?;
        }
        Ok(())
    }

    fn cpfs_section(&mut self, task: &mut Task) -> Result<()> {
        self.expect(Token::LBrace)?;
        while !self.eat(&Token::RBrace) {
            let head = self.expect_ident()?;
            self.eat(&Token::Prime);
            let mut param_names = Vec::new();
            if self.eat(&Token::LParen) {
                loop {
                    match self.next()? {
                        Token::Param(name) => param_names.push(name),
                        token => {
                            self.pos -= 1;
                            return Err(self.error(format!(
                                "expected a parameter in CPF head, found {:?}",
                                token
                            )));
                        }
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
            }
            self.expect(Token::Assign)?;
            let formula = self.expression(task)?;
            self.expect(Token::Semicolon)?;

            let schema = task.schema_id(&head)?;
            if task.cpf_definitions.iter().any(|def| def.schema == schema) {
                return Err(CompileError::DuplicateCpf(head));
            }
            task.cpf_definitions.push(crate::task::CpfDefinition {
                schema,
                param_names,
                formula,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Instance file
    // ------------------------------------------------------------------

    fn instance(&mut self, task: &mut Task) -> Result<()> {
        self.expect_keyword("instance")?;
        task.instance_name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        while !self.eat(&Token::RBrace) {
            let entry = self.expect_ident()?;
            match entry.as_str() {
                "domain" => {
                    self.expect(Token::Assign)?;
                    let name = self.expect_ident()?;
                    if name != task.domain_name {
                        return Err(CompileError::DomainMismatch {
                            required: name,
                            given: task.domain_name.clone(),
                        });
                    }
                    self.expect(Token::Semicolon)?;
                }
                "objects" => {
                    self.expect(Token::LBrace)?;
                    while !self.eat(&Token::RBrace) {
                        let type_name = self.expect_ident()?;
                        self.expect(Token::Colon)?;
                        self.expect(Token::LBrace)?;
                        loop {
                            let object_name = self.expect_ident()?;
                            task.add_object(&type_name, &object_name)?;
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                        self.expect(Token::RBrace)?;
                        self.expect(Token::Semicolon)?;
                    }
                }
                "non-fluents" => {
                    let assignments = self.assignments(task)?;
                    task.non_fluent_values.extend(assignments);
                }
                "init-state" => {
                    let assignments = self.assignments(task)?;
                    task.initial_values.extend(assignments);
                }
                "max-nondef-actions" => {
                    self.expect(Token::Assign)?;
                    task.max_concurrent_actions = self.expect_number()? as usize;
                    self.expect(Token::Semicolon)?;
                }
                "horizon" => {
                    self.expect(Token::Assign)?;
                    task.horizon = self.expect_number()? as usize;
                    self.expect(Token::Semicolon)?;
                }
                "discount" => {
                    self.expect(Token::Assign)?;
                    task.discount_factor = self.expect_number()?;
                    self.expect(Token::Semicolon)?;
                }
                other => return Err(self.error(format!("unknown instance entry '{}'", other))),
            }
        }
        Ok(())
    }

    fn assignments(&mut self, task: &Task) -> Result<Vec<(String, f64)>> {
        let mut result = Vec::new();
        self.expect(Token::LBrace)?;
        while !self.eat(&Token::RBrace) {
            let name = self.expect_ident()?;
            let mut object_names = Vec::new();
            if self.eat(&Token::LParen) {
                loop {
                    object_names.push(self.expect_ident()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
            }
            let value = if self.eat(&Token::Assign) {
                self.value(task)?
            } else {
                // `p(o);` abbreviates `= true`.
                1.0
            };
            self.expect(Token::Semicolon)?;
            let object_names: Vec<&str> = object_names.iter().map(String::as_str).collect();
            result.push((ground_name(&name, &object_names), value));
        }
        Ok(result)
    }

    /// A literal value: a number, a truth value or an enum literal.
    fn value(&mut self, task: &Task) -> Result<f64> {
        match self.next()? {
            Token::Number(value) => Ok(value),
            Token::Minus => Ok(-self.expect_number()?),
            Token::Ident(name) if name == "true" => Ok(1.0),
            Token::Ident(name) if name == "false" => Ok(0.0),
            Token::EnumLiteral(name) => {
                let object = task.object_id(&name)?;
                Ok(task.objects[object].value)
            }
            token => {
                self.pos -= 1;
                Err(self.error(format!("expected a value, found {:?}", token)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self, task: &Task) -> Result<Expr> {
        let mut operands = vec![self.and_expression(task)?];
        while self.eat(&Token::Or) {
            operands.push(self.and_expression(task)?);
        }
        Ok(if operands.len() == 1 {
            operands.pop().unwrap()
        } else {
            Expr::new(Expression::Disjunction(operands))
        })
    }

    fn and_expression(&mut self, task: &Task) -> Result<Expr> {
        let mut operands = vec![self.not_expression(task)?];
        while self.eat(&Token::And) {
            operands.push(self.not_expression(task)?);
        }
        Ok(if operands.len() == 1 {
            operands.pop().unwrap()
        } else {
            Expr::new(Expression::Conjunction(operands))
        })
    }

    fn not_expression(&mut self, task: &Task) -> Result<Expr> {
        if self.eat(&Token::Tilde) {
            let inner = self.not_expression(task)?;
            Ok(Expr::new(Expression::Negation(inner)))
        } else {
            self.comparison(task)
        }
    }

    fn comparison(&mut self, task: &Task) -> Result<Expr> {
        let lhs = self.additive(task)?;
        let build = match self.peek() {
            Some(Token::Equals) => Expression::Equals as fn(Vec<Expr>) -> Expression,
            Some(Token::Greater) => Expression::Greater,
            Some(Token::Lower) => Expression::Lower,
            Some(Token::GreaterEqual) => Expression::GreaterEqual,
            Some(Token::LowerEqual) => Expression::LowerEqual,
            Some(Token::NotEquals) => {
                self.pos += 1;
                let rhs = self.additive(task)?;
                return Ok(Expr::new(Expression::Negation(Expr::new(
                    Expression::Equals(vec![lhs, rhs]),
                ))));
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive(task)?;
        Ok(Expr::new(build(vec![lhs, rhs])))
    }

    fn additive(&mut self, task: &Task) -> Result<Expr> {
        let mut result = self.multiplicative(task)?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.multiplicative(task)?;
                result = Expr::new(Expression::Addition(vec![result, rhs]));
            } else if self.eat(&Token::Minus) {
                let rhs = self.multiplicative(task)?;
                result = Expr::new(Expression::Subtraction(vec![result, rhs]));
            } else {
                return Ok(result);
            }
        }
    }

    fn multiplicative(&mut self, task: &Task) -> Result<Expr> {
        let mut result = self.primary(task)?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.primary(task)?;
                result = Expr::new(Expression::Multiplication(vec![result, rhs]));
            } else if self.eat(&Token::Slash) {
                let rhs = self.primary(task)?;
                result = Expr::new(Expression::Division(vec![result, rhs]));
            } else {
                return Ok(result);
            }
        }
    }

    fn primary(&mut self, task: &Task) -> Result<Expr> {
        match self.next()? {
            Token::Number(value) => Ok(Expression::constant(value)),
            Token::Minus => {
                // A negated operand; the sign is folded during
                // simplification.
                let operand = self.primary(task)?;
                Ok(Expr::new(Expression::Multiplication(vec![
                    Expression::constant(-1.0),
                    operand,
                ])))
            }
            Token::Param(name) => Ok(Expr::new(Expression::Parameter(name))),
            Token::EnumLiteral(name) => {
                Ok(Expr::new(Expression::Object(task.object_id(&name)?)))
            }
            Token::LParen => {
                let inner = self.expression(task)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => self.named_primary(name, task),
            token => {
                self.pos -= 1;
                Err(self.error(format!("expected an expression, found {:?}", token)))
            }
        }
    }

    fn named_primary(&mut self, name: String, task: &Task) -> Result<Expr> {
        match name.as_str() {
            "true" => Ok(Expression::truth()),
            "false" => Ok(Expression::falsity()),
            "if" => {
                self.expect(Token::LParen)?;
                let condition = self.expression(task)?;
                self.expect(Token::RParen)?;
                self.expect_keyword("then")?;
                let if_true = self.expression(task)?;
                self.expect_keyword("else")?;
                let if_false = self.expression(task)?;
                Ok(Expr::new(Expression::IfThenElse {
                    condition,
                    if_true,
                    if_false,
                }))
            }
            "sum_" => self.quantifier(QuantifierKind::Sum, task),
            "prod_" => self.quantifier(QuantifierKind::Product, task),
            "forall_" => self.quantifier(QuantifierKind::Forall, task),
            "exists_" => self.quantifier(QuantifierKind::Exists, task),
            "Bernoulli" => {
                self.expect(Token::LParen)?;
                let probability = self.expression(task)?;
                self.expect(Token::RParen)?;
                Ok(Expr::new(Expression::Bernoulli(probability)))
            }
            "KronDelta" => {
                self.expect(Token::LParen)?;
                let inner = self.expression(task)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            "Discrete" => self.discrete(task),
            "exp" => {
                let closing = if self.eat(&Token::LBracket) {
                    Token::RBracket
                } else {
                    self.expect(Token::LParen)?;
                    Token::RParen
                };
                let inner = self.expression(task)?;
                self.expect(closing)?;
                Ok(Expr::new(Expression::Exponential(inner)))
            }
            _ => self.variable_reference(name, task),
        }
    }

    fn quantifier(&mut self, kind: QuantifierKind, task: &Task) -> Result<Expr> {
        self.expect(Token::LBrace)?;
        let mut params = Vec::new();
        loop {
            match self.next()? {
                Token::Param(name) => {
                    self.expect(Token::Colon)?;
                    let type_name = self.expect_ident()?;
                    params.push((name, task.type_id(&type_name)?));
                }
                token => {
                    self.pos -= 1;
                    return Err(self.error(format!(
                        "expected a quantifier binder, found {:?}",
                        token
                    )));
                }
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        let closing = if self.eat(&Token::LBracket) {
            Token::RBracket
        } else {
            self.expect(Token::LParen)?;
            Token::RParen
        };
        let body = self.expression(task)?;
        self.expect(closing)?;
        Ok(Expr::new(Expression::Quantifier { kind, params, body }))
    }

    fn discrete(&mut self, task: &Task) -> Result<Expr> {
        self.expect(Token::LParen)?;
        let type_name = self.expect_ident()?;
        task.type_id(&type_name)?;
        let mut values = Vec::new();
        let mut probabilities = Vec::new();
        while self.eat(&Token::Comma) {
            values.push(self.expression(task)?);
            self.expect(Token::Colon)?;
            probabilities.push(self.expression(task)?);
        }
        self.expect(Token::RParen)?;
        if values.is_empty() {
            return Err(self.error("a Discrete distribution needs at least one branch"));
        }
        Ok(Expr::new(Expression::Discrete {
            values,
            probabilities,
        }))
    }

    fn variable_reference(&mut self, name: String, task: &Task) -> Result<Expr> {
        let schema = task.schema_id(&name)?;
        let mut params = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                match self.next()? {
                    Token::Param(param) => {
                        params.push(Expr::new(Expression::Parameter(param)))
                    }
                    Token::Ident(object) => {
                        params.push(Expr::new(Expression::Object(task.object_id(&object)?)))
                    }
                    Token::EnumLiteral(object) => {
                        params.push(Expr::new(Expression::Object(task.object_id(&object)?)))
                    }
                    token => {
                        self.pos -= 1;
                        return Err(self.error(format!(
                            "expected a variable parameter, found {:?}",
                            token
                        )));
                    }
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        if self.eat(&Token::Prime) {
            return Err(self.error(format!(
                "primed occurrence of {} outside a CPF head",
                name
            )));
        }
        Ok(Expr::new(Expression::Variable { schema, params }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_domain() -> &'static str {
        "domain toy {
            types { loc; level : {@low, @high}; }
            pvariables {
                at(loc) : {state-fluent, bool, default = false};
                power : {state-fluent, level, default = @low};
                move(loc) : {action-fluent, bool, default = false};
                cost(loc) : {non-fluent, real, default = 0.5};
            }
            cpfs {
                at'(?l) = at(?l) | move(?l);
                power' = if (exists_{?l : loc} [move(?l)]) then @high else @low;
            }
            reward = (sum_{?l : loc} [at(?l)]) - 0.1;
            constraints {
                forall_{?l : loc} [~(move(?l) ^ at(?l))];
            }
        }"
    }

    #[test]
    fn parses_a_complete_domain() {
        let mut task = Task::new();
        parse_domain(toy_domain(), &mut task).unwrap();
        assert_eq!(task.domain_name, "toy");
        assert_eq!(task.cpf_definitions.len(), 2);
        assert_eq!(task.constraint_definitions.len(), 1);
        assert!(task.reward_definition.is_some());
        let level = task.type_id("level").unwrap();
        assert_eq!(task.types[level].objects.len(), 2);
    }

    #[test]
    fn parses_an_instance_with_bindings() {
        let mut task = Task::new();
        parse_domain(toy_domain(), &mut task).unwrap();
        parse_instance(
            "instance toy1 {
                domain = toy;
                objects { loc : {l1, l2}; }
                non-fluents { cost(l1) = 0.2; }
                init-state { at(l1); power = @high; }
                max-nondef-actions = 1;
                horizon = 10;
                discount = 0.9;
            }",
            &mut task,
        )
        .unwrap();
        assert_eq!(task.instance_name, "toy1");
        assert_eq!(task.horizon, 10);
        assert_eq!(task.max_concurrent_actions, 1);
        assert_eq!(task.initial_values.get("at(l1)"), Some(&1.0));
        assert_eq!(task.initial_values.get("power"), Some(&1.0));
        assert_eq!(task.non_fluent_values.get("cost(l1)"), Some(&0.2));
    }

    #[test]
    fn duplicate_cpf_heads_are_rejected() {
        let mut task = Task::new();
        let text = "domain d {
            pvariables { p : {state-fluent, bool, default = false}; }
            cpfs { p' = p; p' = ~p; }
            reward = p;
        }";
        assert!(matches!(
            parse_domain(text, &mut task),
            Err(CompileError::DuplicateCpf(_))
        ));
    }

    #[test]
    fn operator_precedence_groups_and_over_or() {
        let mut task = Task::new();
        parse_domain(
            "domain d {
                pvariables {
                    a : {state-fluent, bool, default = false};
                    b : {state-fluent, bool, default = false};
                    c : {state-fluent, bool, default = false};
                }
                cpfs { a' = a | b ^ c; }
                reward = 0;
            }",
            &mut task,
        )
        .unwrap();
        match &*task.cpf_definitions[0].formula {
            Expression::Disjunction(operands) => {
                assert!(matches!(&*operands[1], Expression::Conjunction(_)));
            }
            other => panic!("expected a disjunction, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_instance_domain_is_rejected() {
        let mut task = Task::new();
        parse_domain(toy_domain(), &mut task).unwrap();
        let result = parse_instance(
            "instance i { domain = other; horizon = 5; }",
            &mut task,
        );
        assert!(matches!(result, Err(CompileError::DomainMismatch { .. })));
    }
}
