//! 命令参数校验
//!
//! 按声明顺序逐位校验调用参数：必填检查、缺省值代入、运行时类型检查、
//! 枚举限定与校验规则。模式之外的多余位置参数原样透传（支持尾部可变参数）。

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{PaletteError, PaletteResult};
use crate::types::{ArgumentSchema, ArgumentType, Command, ValidationRules};

/// 已编译正则的进程级缓存（模式字符串 -> 编译结果）
static PATTERN_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Value 的运行时类型名（用于错误信息）
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 参数校验器
pub struct ArgumentValidator;

impl ArgumentValidator {
    /// 校验调用参数并返回代入缺省值后的最终参数表
    ///
    /// 位置越界或显式 null 视为"未提供"。任何失败都发生在处理器调用之前。
    pub fn validate(command: &Command, args: &[Value]) -> PaletteResult<Vec<Value>> {
        let mut finalized: Vec<Value> = Vec::with_capacity(args.len().max(command.arguments.len()));

        for (index, schema) in command.arguments.iter().enumerate() {
            let provided = args.get(index).filter(|v| !v.is_null());

            let value = match provided {
                Some(value) => value.clone(),
                None => match &schema.default {
                    Some(default) => default.clone(),
                    None => {
                        if schema.required {
                            return Err(PaletteError::missing_argument(&command.id, &schema.name));
                        }
                        // 可选且无缺省：保留 null 占位，不做后续检查
                        finalized.push(Value::Null);
                        continue;
                    }
                },
            };

            Self::check_type(schema, &value)?;
            Self::check_enum(schema, &value)?;
            if let Some(rules) = &schema.validation {
                Self::check_rules(schema, rules, &value)?;
            }

            finalized.push(value);
        }

        // 多余的位置参数透传
        if args.len() > command.arguments.len() {
            finalized.extend_from_slice(&args[command.arguments.len()..]);
        }

        Ok(finalized)
    }

    /// 运行时类型检查（array/object 按结构判断）
    fn check_type(schema: &ArgumentSchema, value: &Value) -> PaletteResult<()> {
        let matches = match schema.arg_type {
            ArgumentType::String => value.is_string(),
            ArgumentType::Number => value.is_number(),
            ArgumentType::Boolean => value.is_boolean(),
            ArgumentType::Array => value.is_array(),
            ArgumentType::Object => value.is_object(),
            // 文件以路径字符串表示
            ArgumentType::File => value.is_string(),
            // 选区是结构化对象
            ArgumentType::Selection => value.is_object(),
        };

        if matches {
            Ok(())
        } else {
            Err(PaletteError::argument_type(
                &schema.name,
                schema.arg_type.to_string(),
                value_type_name(value),
            ))
        }
    }

    /// 枚举限定检查
    fn check_enum(schema: &ArgumentSchema, value: &Value) -> PaletteResult<()> {
        let Some(allowed) = &schema.enum_values else {
            return Ok(());
        };
        if allowed.contains(value) {
            Ok(())
        } else {
            Err(PaletteError::ArgumentEnum {
                name: schema.name.clone(),
                value: value.to_string(),
            })
        }
    }

    /// 校验规则按声明顺序应用，首个失败终止后续检查
    fn check_rules(
        schema: &ArgumentSchema,
        rules: &ValidationRules,
        value: &Value,
    ) -> PaletteResult<()> {
        if let (Some(pattern), Some(s)) = (&rules.pattern, value.as_str()) {
            if !Self::pattern_matches(pattern, s)? {
                return Err(PaletteError::argument_validation(
                    &schema.name,
                    "pattern",
                    format!("值不匹配模式: {}", pattern),
                ));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = rules.min {
                if n < min {
                    return Err(PaletteError::argument_validation(
                        &schema.name,
                        "min",
                        format!("值必须 >= {}", min),
                    ));
                }
            }
            if let Some(max) = rules.max {
                if n > max {
                    return Err(PaletteError::argument_validation(
                        &schema.name,
                        "max",
                        format!("值必须 <= {}", max),
                    ));
                }
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };
        if let Some(length) = length {
            if let Some(min_length) = rules.min_length {
                if length < min_length {
                    return Err(PaletteError::argument_validation(
                        &schema.name,
                        "minLength",
                        format!("长度必须至少为 {}", min_length),
                    ));
                }
            }
            if let Some(max_length) = rules.max_length {
                if length > max_length {
                    return Err(PaletteError::argument_validation(
                        &schema.name,
                        "maxLength",
                        format!("长度不能超过 {}", max_length),
                    ));
                }
            }
        }

        if let Some(custom) = &rules.custom {
            if let Err(message) = custom(value) {
                return Err(PaletteError::argument_validation(
                    &schema.name,
                    "custom",
                    message,
                ));
            }
        }

        Ok(())
    }

    /// 带缓存的正则匹配；非法模式按校验失败处理而不是 panic
    fn pattern_matches(pattern: &str, value: &str) -> PaletteResult<bool> {
        let mut cache = PATTERN_CACHE.lock();
        let compiled = cache
            .entry(pattern.to_string())
            .or_insert_with(|| Regex::new(pattern).ok());

        match compiled {
            Some(regex) => Ok(regex.is_match(value)),
            None => Err(PaletteError::argument_validation(
                "pattern",
                "pattern",
                format!("非法正则模式: {}", pattern),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sync_handler_fn;
    use serde_json::json;
    use std::sync::Arc;

    fn command_with_args(arguments: Vec<ArgumentSchema>) -> Command {
        Command::new("test.cmd", "Test", sync_handler_fn(|_| Ok(json!(null))))
            .with_arguments(arguments)
    }

    #[test]
    fn test_missing_required_argument() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "text",
            ArgumentType::String,
            true,
        )]);

        let err = ArgumentValidator::validate(&command, &[]).unwrap_err();
        assert!(matches!(err, PaletteError::MissingArgument { .. }));

        // 显式 null 同样视为未提供
        let err = ArgumentValidator::validate(&command, &[json!(null)]).unwrap_err();
        assert!(matches!(err, PaletteError::MissingArgument { .. }));
    }

    #[test]
    fn test_default_substitution() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "count",
            ArgumentType::Number,
            true,
        )
        .with_default(json!(10))]);

        let finalized = ArgumentValidator::validate(&command, &[]).unwrap();
        assert_eq!(finalized, vec![json!(10)]);

        // 提供值时不代入缺省
        let finalized = ArgumentValidator::validate(&command, &[json!(3)]).unwrap();
        assert_eq!(finalized, vec![json!(3)]);
    }

    #[test]
    fn test_type_mismatch() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "count",
            ArgumentType::Number,
            true,
        )]);

        let err = ArgumentValidator::validate(&command, &[json!("three")]).unwrap_err();
        match err {
            PaletteError::ArgumentType {
                name,
                expected,
                actual,
            } => {
                assert_eq!(name, "count");
                assert_eq!(expected, "number");
                assert_eq!(actual, "string");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_structural_types() {
        let command = command_with_args(vec![
            ArgumentSchema::new("items", ArgumentType::Array, true),
            ArgumentSchema::new("options", ArgumentType::Object, true),
            ArgumentSchema::new("path", ArgumentType::File, true),
            ArgumentSchema::new("sel", ArgumentType::Selection, true),
        ]);

        let args = vec![
            json!([1, 2]),
            json!({"a": 1}),
            json!("/tmp/a.txt"),
            json!({"start": {"line": 0, "column": 0}, "end": {"line": 0, "column": 4}}),
        ];
        assert!(ArgumentValidator::validate(&command, &args).is_ok());

        // 数组不是对象
        let bad = vec![json!([1]), json!([2]), json!("x"), json!({})];
        assert!(ArgumentValidator::validate(&command, &bad).is_err());
    }

    #[test]
    fn test_enum_restriction() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "mode",
            ArgumentType::String,
            true,
        )
        .with_enum(vec![json!("fast"), json!("slow")])]);

        assert!(ArgumentValidator::validate(&command, &[json!("fast")]).is_ok());
        let err = ArgumentValidator::validate(&command, &[json!("medium")]).unwrap_err();
        assert!(matches!(err, PaletteError::ArgumentEnum { .. }));
    }

    #[test]
    fn test_rule_order_first_failure_wins() {
        // pattern 在 minLength 之前声明，应先报 pattern
        let command = command_with_args(vec![ArgumentSchema::new(
            "name",
            ArgumentType::String,
            true,
        )
        .with_validation(ValidationRules {
            pattern: Some("^[a-z]+$".to_string()),
            min_length: Some(10),
            ..Default::default()
        })]);

        let err = ArgumentValidator::validate(&command, &[json!("ABC")]).unwrap_err();
        match err {
            PaletteError::ArgumentValidation { rule, .. } => assert_eq!(rule, "pattern"),
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_numeric_bounds() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "level",
            ArgumentType::Number,
            true,
        )
        .with_validation(ValidationRules {
            min: Some(1.0),
            max: Some(5.0),
            ..Default::default()
        })]);

        assert!(ArgumentValidator::validate(&command, &[json!(3)]).is_ok());
        assert!(ArgumentValidator::validate(&command, &[json!(0)]).is_err());
        assert!(ArgumentValidator::validate(&command, &[json!(6)]).is_err());
    }

    #[test]
    fn test_custom_validator() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "email",
            ArgumentType::String,
            true,
        )
        .with_validation(ValidationRules {
            custom: Some(Arc::new(|value: &Value| {
                if value.as_str().map(|s| s.contains('@')).unwrap_or(false) {
                    Ok(())
                } else {
                    Err("缺少 @".to_string())
                }
            })),
            ..Default::default()
        })]);

        assert!(ArgumentValidator::validate(&command, &[json!("a@b.c")]).is_ok());
        let err = ArgumentValidator::validate(&command, &[json!("nope")]).unwrap_err();
        match err {
            PaletteError::ArgumentValidation { rule, message, .. } => {
                assert_eq!(rule, "custom");
                assert_eq!(message, "缺少 @");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_extra_args_pass_through() {
        let command = command_with_args(vec![ArgumentSchema::new(
            "first",
            ArgumentType::String,
            true,
        )]);

        let finalized =
            ArgumentValidator::validate(&command, &[json!("a"), json!(1), json!(true)]).unwrap();
        assert_eq!(finalized, vec![json!("a"), json!(1), json!(true)]);
    }

    #[test]
    fn test_optional_without_default_keeps_placeholder() {
        let command = command_with_args(vec![
            ArgumentSchema::new("first", ArgumentType::String, false),
            ArgumentSchema::new("second", ArgumentType::Number, true),
        ]);

        let finalized = ArgumentValidator::validate(&command, &[json!(null), json!(2)]).unwrap();
        assert_eq!(finalized, vec![json!(null), json!(2)]);
    }
}
