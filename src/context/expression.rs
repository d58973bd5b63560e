//! 上下文表达式求值
//!
//! 解析并求值门控命令可见性/启用状态的布尔 "when" 表达式。
//! 支持标识符、字符串/数字/布尔字面量、`!`、`&&`、`||`、`==`、`!=` 与括号。
//! `!` 结合最紧，`==`/`!=` 比布尔连接符结合更紧，`&&`/`||` 同级从左到右折叠。
//! 未知标识符求值为假；格式错误不会抛错，而是返回 result=false 加 parse_error。

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::store::ContextStore;
use crate::types::ContextExpressionResult;

/// JS 风格的真值判断：null/false/0/"" 为假，数组与对象为真
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Not,
    And,
    Or,
    Eq,
    Ne,
    LParen,
    RParen,
}

impl Token {
    fn is_operator(&self) -> bool {
        matches!(self, Self::Not | Self::And | Self::Or | Self::Eq | Self::Ne)
    }

    /// 比较右操作数转换为运行时值
    fn as_comparand(&self) -> Option<Value> {
        match self {
            Self::Str(s) => Some(Value::String(s.clone())),
            Self::Num(n) => serde_json::Number::from_f64(*n).map(Value::Number),
            Self::Bool(b) => Some(Value::Bool(*b)),
            // 未加引号的裸词按字符串比较
            Self::Ident(s) => Some(Value::String(s.clone())),
            _ => None,
        }
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err("孤立的 '&'".to_string());
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err("孤立的 '|'".to_string());
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err("孤立的 '='".to_string());
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err("未闭合的字符串字面量".to_string());
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            '0'..='9' => {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let text: String = chars[start..j].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| format!("非法数字字面量: {}", text))?;
                tokens.push(Token::Num(num));
                i = j;
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < chars.len()
                    && (chars[j].is_ascii_alphanumeric()
                        || chars[j] == '_'
                        || chars[j] == '.'
                        || chars[j] == '-')
                {
                    j += 1;
                }
                let ident: String = chars[start..j].iter().collect();
                match ident.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Ident(ident)),
                }
                i = j;
            }
            other => return Err(format!("意外的字符: '{}'", other)),
        }
    }

    Ok(tokens)
}

/// 上下文表达式求值器
pub struct ExpressionEvaluator {
    store: Arc<ContextStore>,
}

impl ExpressionEvaluator {
    pub fn new(store: Arc<ContextStore>) -> Self {
        Self { store }
    }

    /// 求值表达式
    ///
    /// 纯函数：存储内容与表达式相同则重复调用结果一致。
    pub fn evaluate(&self, expression: &str) -> ContextExpressionResult {
        self.evaluate_with_overlay(expression, &HashMap::new())
    }

    /// 带覆盖层的求值（覆盖层键遮蔽存储里的同名键，用于宏变量）
    pub fn evaluate_with_overlay(
        &self,
        expression: &str,
        overlay: &HashMap<String, Value>,
    ) -> ContextExpressionResult {
        let mut used_keys = Vec::new();

        let outcome = (|| {
            if expression.trim().is_empty() {
                return Err("空表达式".to_string());
            }
            let tokens = tokenize(expression)?;
            if let Some(last) = tokens.last() {
                if last.is_operator() {
                    return Err("表达式以运算符结尾".to_string());
                }
            }
            self.eval_tokens(&tokens, &mut used_keys, overlay)
        })();

        match outcome {
            Ok(result) => ContextExpressionResult {
                expression: expression.to_string(),
                result,
                used_keys,
                parse_error: None,
            },
            Err(message) => ContextExpressionResult {
                expression: expression.to_string(),
                result: false,
                used_keys: Vec::new(),
                parse_error: Some(message),
            },
        }
    }

    fn resolve(&self, key: &str, overlay: &HashMap<String, Value>) -> Option<Value> {
        overlay
            .get(key)
            .cloned()
            .or_else(|| self.store.get_context(key))
    }

    /// 从左到右折叠布尔项；`&&` 与 `||` 同级
    fn eval_tokens(
        &self,
        tokens: &[Token],
        used_keys: &mut Vec<String>,
        overlay: &HashMap<String, Value>,
    ) -> Result<bool, String> {
        let mut result = true;
        let mut current_op = Token::And;
        let mut negate = false;
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Not => {
                    negate = !negate;
                    i += 1;
                }
                Token::And | Token::Or => {
                    current_op = tokens[i].clone();
                    i += 1;
                }
                Token::LParen => {
                    let mut depth = 1;
                    let mut j = i + 1;
                    while j < tokens.len() && depth > 0 {
                        match tokens[j] {
                            Token::LParen => depth += 1,
                            Token::RParen => depth -= 1,
                            _ => {}
                        }
                        j += 1;
                    }
                    if depth > 0 {
                        return Err("括号不匹配".to_string());
                    }
                    let mut sub = self.eval_tokens(&tokens[i + 1..j - 1], used_keys, overlay)?;
                    if negate {
                        sub = !sub;
                        negate = false;
                    }
                    result = apply_op(result, sub, &current_op);
                    i = j;
                }
                Token::RParen => return Err("意外的右括号".to_string()),
                Token::Eq | Token::Ne => return Err("比较运算符缺少左操作数".to_string()),
                Token::Ident(key)
                    if matches!(tokens.get(i + 1), Some(Token::Eq) | Some(Token::Ne)) =>
                {
                    let op = tokens[i + 1].clone();
                    let rhs = tokens
                        .get(i + 2)
                        .ok_or_else(|| "比较运算符缺少右操作数".to_string())?;
                    let comparand = rhs
                        .as_comparand()
                        .ok_or_else(|| "比较右操作数必须是字面量或标识符".to_string())?;

                    push_used(used_keys, key);
                    let actual = self.resolve(key, overlay).unwrap_or(Value::Null);
                    let equal = values_equal(&actual, &comparand);
                    let mut term = if op == Token::Eq { equal } else { !equal };

                    if negate {
                        term = !term;
                        negate = false;
                    }
                    result = apply_op(result, term, &current_op);
                    i += 3;
                }
                Token::Ident(key) => {
                    push_used(used_keys, key);
                    let mut term = self
                        .resolve(key, overlay)
                        .map(|v| is_truthy(&v))
                        .unwrap_or(false);

                    if negate {
                        term = !term;
                        negate = false;
                    }
                    result = apply_op(result, term, &current_op);
                    i += 1;
                }
                literal @ (Token::Str(_) | Token::Num(_) | Token::Bool(_)) => {
                    let value = literal.as_comparand().unwrap_or(Value::Null);
                    let mut term = is_truthy(&value);
                    if negate {
                        term = !term;
                        negate = false;
                    }
                    result = apply_op(result, term, &current_op);
                    i += 1;
                }
            }
        }

        Ok(result)
    }
}

fn push_used(used_keys: &mut Vec<String>, key: &str) {
    if !used_keys.iter().any(|k| k == key) {
        used_keys.push(key.to_string());
    }
}

fn apply_op(a: bool, b: bool, op: &Token) -> bool {
    match op {
        Token::And => a && b,
        Token::Or => a || b,
        _ => b,
    }
}

/// 值相等比较：数字按 f64 比较，其余按结构比较
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
