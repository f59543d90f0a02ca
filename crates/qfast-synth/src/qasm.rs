//! Minimal OpenQASM 2 reader and writer for program fragments.
//!
//! Native tools return small single-register programs such as
//!
//! ```text
//! OPENQASM 2.0;
//! include "qelib1.inc";
//! qreg q[2];
//! u3(0.1,0.2,0.3) q[0];
//! cx q[0],q[1];
//! ```
//!
//! Only the header, one `qreg` declaration and gate statements are
//! understood. Gate parameters are kept as written so that expressions like
//! `pi/2` survive recombination untouched.

use std::ops::Range;

use itertools::Itertools;
use logos::Logos;

use crate::error::{SynthError, SynthResult};

/// Tokens of an OpenQASM 2 fragment.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("OPENQASM")]
    OpenQasm,

    #[token("include")]
    Include,

    #[token("qreg")]
    Qreg,

    #[token("creg")]
    Creg,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<usize>().ok())]
    IntLiteral(usize),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    StringLiteral(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("^")]
    Caret,

    #[token("->")]
    Arrow,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,
}

/// One gate application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Gate name.
    pub name: String,
    /// Parenthesized parameter list as written, or empty.
    pub params: String,
    /// Register indices the gate acts on.
    pub qubits: Vec<usize>,
}

/// A parsed single-register fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Width of the declared register.
    pub num_qubits: usize,
    /// Gate statements in order.
    pub instructions: Vec<Instruction>,
}

/// Parse a fragment.
pub fn parse_fragment(source: &str) -> SynthResult<Fragment> {
    let tokens = tokenize(source)?;
    let mut register: Option<(String, usize)> = None;
    let mut instructions = Vec::new();

    for statement in tokens.split(|(token, _)| *token == Token::Semicolon) {
        let Some((first, span)) = statement.first() else {
            continue;
        };
        let line = line_of(source, span.start);
        match first {
            Token::OpenQasm | Token::Include => {}
            Token::Qreg => {
                if register.is_some() {
                    return Err(qasm_error(line, "multiple register declarations"));
                }
                register = Some(parse_register(statement, line)?);
            }
            Token::Creg => {
                return Err(qasm_error(line, "classical registers are not supported"));
            }
            Token::Identifier(name) => {
                let Some((reg_name, size)) = &register else {
                    return Err(qasm_error(line, "no qubit register declared"));
                };
                instructions.push(parse_gate(source, name, statement, reg_name, *size, line)?);
            }
            other => {
                return Err(qasm_error(line, &format!("unexpected token '{other:?}'")));
            }
        }
    }

    let num_qubits = register.map_or(0, |(_, size)| size);
    Ok(Fragment {
        num_qubits,
        instructions,
    })
}

/// Write a program over register `q` with the standard header.
pub fn emit_program(num_qubits: usize, instructions: &[Instruction]) -> String {
    let mut out = String::from("OPENQASM 2.0;\ninclude \"qelib1.inc\";\n");
    out.push_str(&format!("qreg q[{num_qubits}];\n"));
    for inst in instructions {
        let operands = inst.qubits.iter().map(|q| format!("q[{q}]")).join(",");
        out.push_str(&format!("{}{} {};\n", inst.name, inst.params, operands));
    }
    out
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

type Spanned = (Token, Range<usize>);

fn tokenize(source: &str) -> SynthResult<Vec<Spanned>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(qasm_error(
                    line_of(source, span.start),
                    &format!("invalid token '{}'", lexer.slice()),
                ));
            }
        }
    }
    Ok(tokens)
}

fn parse_register(statement: &[Spanned], line: usize) -> SynthResult<(String, usize)> {
    match statement {
        [
            (Token::Qreg, _),
            (Token::Identifier(name), _),
            (Token::LBracket, _),
            (Token::IntLiteral(size), _),
            (Token::RBracket, _),
        ] => Ok((name.clone(), *size)),
        _ => Err(qasm_error(line, "malformed qreg declaration")),
    }
}

fn parse_gate(
    source: &str,
    name: &str,
    statement: &[Spanned],
    register: &str,
    size: usize,
    line: usize,
) -> SynthResult<Instruction> {
    let mut rest = &statement[1..];

    let mut params = String::new();
    if let Some((Token::LParen, open)) = rest.first() {
        let mut depth = 0usize;
        let mut close = None;
        for (i, (token, span)) in rest.iter().enumerate() {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some((i, span.end));
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some((index, end)) = close else {
            return Err(qasm_error(line, "unbalanced parentheses"));
        };
        params = source[open.start..end].to_string();
        rest = &rest[index + 1..];
    }

    let mut qubits = Vec::new();
    for operand in rest.split(|(token, _)| *token == Token::Comma) {
        match operand {
            [
                (Token::Identifier(reg), _),
                (Token::LBracket, _),
                (Token::IntLiteral(index), _),
                (Token::RBracket, _),
            ] if reg == register => {
                if *index >= size {
                    return Err(qasm_error(
                        line,
                        &format!("index {index} out of bounds for register '{register}' of size {size}"),
                    ));
                }
                qubits.push(*index);
            }
            _ => return Err(qasm_error(line, &format!("malformed operand in '{name}' statement"))),
        }
    }
    if qubits.is_empty() {
        return Err(qasm_error(line, &format!("gate '{name}' has no qubit operands")));
    }

    Ok(Instruction {
        name: name.to_string(),
        params,
        qubits,
    })
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

fn qasm_error(line: usize, message: &str) -> SynthError {
    SynthError::Qasm {
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BELL: &str = "OPENQASM 2.0;\ninclude \"qelib1.inc\";\nqreg q[2];\nu3(pi/2, 0, 1e-3) q[0];\ncx q[0],q[1];\n";

    #[test]
    fn test_parse_simple_fragment() {
        let fragment = parse_fragment(BELL).unwrap();
        assert_eq!(fragment.num_qubits, 2);
        assert_eq!(fragment.instructions.len(), 2);
        assert_eq!(fragment.instructions[0].name, "u3");
        assert_eq!(fragment.instructions[0].params, "(pi/2, 0, 1e-3)");
        assert_eq!(fragment.instructions[1].qubits, vec![0, 1]);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let src = "// header\nqreg r[3];\n\nh r[2]; // trailing\n";
        let fragment = parse_fragment(src).unwrap();
        assert_eq!(fragment.instructions[0].qubits, vec![2]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_fragment("qreg q[1];\nqreg r[1];"),
            Err(SynthError::Qasm { line: 2, .. })
        ));
        assert!(parse_fragment("x q[0];").is_err());
        assert!(parse_fragment("qreg q[1];\nx q[1];").is_err());
        assert!(parse_fragment("qreg q[1];\nx r[0];").is_err());
        assert!(parse_fragment("qreg q[1];\ncreg c[1];").is_err());
        assert!(parse_fragment("qreg q[1];\nu3(0, 0 q[0];").is_err());
    }

    #[test]
    fn test_emit_program() {
        let inst = Instruction {
            name: "cx".into(),
            params: String::new(),
            qubits: vec![2, 0],
        };
        let out = emit_program(3, &[inst]);
        assert_eq!(out, "OPENQASM 2.0;\ninclude \"qelib1.inc\";\nqreg q[3];\ncx q[2],q[0];\n");
    }
}
