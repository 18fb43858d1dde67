use std::collections::HashSet;

use utils::DiagnosticEmitter;

use crate::{
    ir::{self, Entry, IdentifierType, Inst, Label, Method, TryId, Unit},
    lexer::{Identifier, LexResult, Token, TokenValue},
};

pub struct Parser<'src> {
    current_tok: usize,
    tokens: Vec<Token>,
    unit: Unit,
    diag: &'src mut DiagnosticEmitter,
}

use IdentifierType::*;
use TokenValue::*;

impl<'src> Parser<'src> {
    pub fn new(lexed: LexResult, diag: &'src mut DiagnosticEmitter) -> Self {
        let LexResult {
            tokens,
            identifier_table,
        } = lexed;

        Parser {
            current_tok: 0,
            tokens,
            unit: Unit {
                methods: Vec::new(),
                identifiers: identifier_table,
            },
            diag,
        }
    }

    pub fn parse(mut self) -> Option<ir::Unit> {
        while !self.is_at_end() {
            let method = self.parse_method()?;
            self.unit.methods.push(method);
        }
        Some(self.unit)
    }

    fn parse_method(&mut self) -> Option<Method> {
        let (name_tok, name, _) = self.consume_identifier(&[Method])?;
        self.consume(LeftBrace, "")?;

        let mut entries = Vec::new();
        let mut defined = HashSet::new();
        while !self.check(RightBrace) && !self.is_at_end() {
            entries.push(self.parse_entry(&mut defined)?);
        }
        self.consume(RightBrace, "")?;

        if entries.is_empty() {
            self.error(name_tok, "Empty method body.");
            return None;
        }

        // The graph construction trusts its input; dangling labels
        // are diagnosed here where the source location is known.
        for entry in &entries {
            let Some(inst) = entry.as_inst()
            else {
                continue;
            };
            for label in inst.branch_targets() {
                if !defined.contains(&label) {
                    self.error(
                        name_tok,
                        &format!(
                            "Undefined label '{}'.",
                            self.unit.identifiers.get_name(label.0)
                        ),
                    );
                    return None;
                }
            }
        }

        Some(Method { name, entries })
    }

    fn parse_entry(&mut self, defined: &mut HashSet<Label>) -> Option<Entry> {
        if self.try_consume(TryStart).is_some() {
            let (_, region, _) = self.consume_identifier(&[Local])?;
            self.consume(Semicolon, "")?;
            return Some(Entry::TryStart(TryId(region)));
        }

        if self.try_consume(TryEnd).is_some() {
            let (_, region, _) = self.consume_identifier(&[Local])?;
            self.consume(Semicolon, "")?;
            return Some(Entry::TryEnd(TryId(region)));
        }

        if self.try_consume(Catch).is_some() {
            let (_, region, _) = self.consume_identifier(&[Local])?;
            self.consume(Semicolon, "")?;
            return Some(Entry::Catch(TryId(region)));
        }

        if let Some(tok) = self.try_consume(Pos) {
            let Some(Token {
                value: Integer(line),
                ..
            }) = self.match_tokens(&[Integer(0)])
            else {
                self.error(tok, "Line number expected.");
                return None;
            };
            self.consume(Semicolon, "")?;
            return Some(Entry::Position(line));
        }

        if self.try_consume(DebugInfo).is_some() {
            let (_, info, _) = self.consume_identifier(&[Local])?;
            self.consume(Semicolon, "")?;
            return Some(Entry::Debug(info));
        }

        if self.try_consume(Goto).is_some() {
            let (_, target, _) = self.consume_identifier(&[IdentifierType::Label])?;
            self.consume(Semicolon, "")?;
            return Some(Entry::Inst(Inst::Goto {
                target: Label(target),
            }));
        }

        if self.try_consume(If).is_some() {
            let (_, cond, _) = self.consume_identifier(&[Local])?;
            let (_, target, _) = self.consume_identifier(&[IdentifierType::Label])?;
            self.consume(Semicolon, "")?;
            return Some(Entry::Inst(Inst::Branch {
                cond,
                target: Label(target),
            }));
        }

        if let Some(tok) = self.try_consume(Switch) {
            let (_, scrutinee, _) = self.consume_identifier(&[Local])?;
            let mut cases = Vec::new();
            while !self.check(Semicolon) {
                let (_, case, _) = self.consume_identifier(&[IdentifierType::Label])?;
                cases.push(Label(case));
            }
            self.consume(Semicolon, "")?;
            if cases.is_empty() {
                self.error(tok, "Switch with no cases.");
                return None;
            }
            return Some(Entry::Inst(Inst::Switch { scrutinee, cases }));
        }

        if self.try_consume(Return).is_some() {
            let value = self.parse_optional_operand()?;
            return Some(Entry::Inst(Inst::Return { value }));
        }

        if self.try_consume(Throw).is_some() {
            let value = self.parse_optional_operand()?;
            return Some(Entry::Inst(Inst::Throw { value }));
        }

        // A label definition or an opaque instruction.
        let (tok, id, id_type) = self.consume_identifier(&[Local, IdentifierType::Label])?;
        if id_type == IdentifierType::Label {
            self.consume(Colon, "")?;
            let label = Label(id);
            if !defined.insert(label) {
                self.error(
                    tok,
                    &format!(
                        "Duplicate label '{}'.",
                        self.unit.identifiers.get_name(id)
                    ),
                );
                return None;
            }
            return Some(Entry::Target(label));
        }

        let mut args = Vec::new();
        while !self.check(Semicolon) {
            let (_, arg, _) = self.consume_identifier(&[Local])?;
            args.push(arg);
        }
        self.consume(Semicolon, "")?;
        Some(Entry::Inst(Inst::Op { mnemonic: id, args }))
    }

    fn parse_optional_operand(&mut self) -> Option<Option<Identifier>> {
        if self.try_consume(Semicolon).is_some() {
            return Some(None);
        }
        let (_, value, _) = self.consume_identifier(&[Local])?;
        self.consume(Semicolon, "")?;
        Some(Some(value))
    }

    fn peek(&self) -> Token {
        self.tokens[self.current_tok]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current_tok - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().value, EndOfFile)
    }

    fn check(&self, tok_val: TokenValue) -> bool {
        if self.is_at_end() {
            false
        } else {
            core::mem::discriminant(&self.peek().value) == core::mem::discriminant(&tok_val)
        }
    }

    fn match_tokens(&mut self, tok_vals: &[TokenValue]) -> Option<Token> {
        if tok_vals.iter().any(|val| self.check(*val)) {
            let prev = self.advance();
            return Some(prev);
        }
        None
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current_tok += 1;
        }
        self.previous()
    }

    fn consume(&mut self, tok_val: TokenValue, s: &str) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        let msg = if s.is_empty() {
            format!("'{tok_val}' expected.")
        } else {
            s.to_owned()
        };
        self.error(self.peek(), &msg);
        None
    }

    fn consume_identifier(
        &mut self,
        expected: &[IdentifierType],
    ) -> Option<(Token, Identifier, IdentifierType)> {
        if let Id(id) = self.peek().value {
            let token = self.advance();
            let id_type = match self
                .unit
                .identifiers
                .get_name(id)
                .chars()
                .next()
                .unwrap()
            {
                '.' => IdentifierType::Label,
                '@' => Method,
                _ => Local,
            };

            if !expected.iter().any(|&t| t == id_type) {
                self.error(token, "Unexpected identifier type.");
                return None;
            }

            return Some((token, id, id_type));
        }
        self.error(self.peek(), "Identifier expected.");
        None
    }

    fn try_consume(&mut self, tok_val: TokenValue) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        None
    }

    fn error(&mut self, tok: Token, s: &str) {
        if tok.value == EndOfFile {
            self.diag.report(tok.line_num.0, "at end of file", s);
        } else {
            self.diag.report(tok.line_num.0, &format!("at '{tok}'"), s);
        }
    }
}
