//! 条件值比较
//!
//! 叶子处理器取得实际值后，通过 [`ValueComparer`] 按条件的操作符与期望值比较。
//! 描述符标记为序列比较时，实际值和期望值都按集合处理。

use serde_json::Value;

use crate::error::{Result, RuleError};
use crate::expression::RuleExpression;
use crate::operators::RuleOperator;

/// 条件值比较器
pub struct ValueComparer;

impl ValueComparer {
    /// 按条件节点的操作符、期望值和描述符比较实际值
    pub fn matches(actual: Option<&Value>, expression: &RuleExpression) -> Result<bool> {
        Self::evaluate(
            actual,
            expression.operator,
            &expression.value,
            expression.is_comparing_sequences(),
        )
    }

    /// 比较实际值与期望值
    ///
    /// # Arguments
    /// * `actual` - 处理器取得的实际值
    /// * `operator` - 操作符
    /// * `expected` - 规则中定义的期望值
    /// * `sequences` - 是否按集合比较
    pub fn evaluate(
        actual: Option<&Value>,
        operator: RuleOperator,
        expected: &Value,
        sequences: bool,
    ) -> Result<bool> {
        // 空值检查的语义就是检查值是否存在
        match operator {
            RuleOperator::IsEmpty => return Ok(Self::is_empty(actual)),
            RuleOperator::IsNotEmpty => return Ok(!Self::is_empty(actual)),
            _ => {}
        }

        // 实际值不存在时，其余操作返回 false
        let actual = match actual {
            Some(v) => v,
            None => return Ok(false),
        };

        if sequences {
            return Self::evaluate_sequence(actual, operator, expected);
        }

        match operator {
            RuleOperator::Eq => Ok(Self::eq(actual, expected)),
            RuleOperator::Neq => Ok(!Self::eq(actual, expected)),
            RuleOperator::Gt => {
                Self::compare(actual, expected, |a, b| a > b && !Self::approx_eq(a, b))
            }
            RuleOperator::Gte => {
                Self::compare(actual, expected, |a, b| a > b || Self::approx_eq(a, b))
            }
            RuleOperator::Lt => {
                Self::compare(actual, expected, |a, b| a < b && !Self::approx_eq(a, b))
            }
            RuleOperator::Lte => {
                Self::compare(actual, expected, |a, b| a < b || Self::approx_eq(a, b))
            }
            RuleOperator::In => Self::in_list(actual, expected),
            RuleOperator::NotIn => Self::in_list(actual, expected).map(|r| !r),
            RuleOperator::Contains => Self::contains(actual, expected),
            RuleOperator::NotContains => Self::contains(actual, expected).map(|r| !r),
            RuleOperator::StartsWith => {
                Ok(Self::as_str(actual)?.starts_with(Self::as_str(expected)?))
            }
            RuleOperator::EndsWith => Ok(Self::as_str(actual)?.ends_with(Self::as_str(expected)?)),
            RuleOperator::AllIn | RuleOperator::NotAllIn => Err(RuleError::TypeMismatch {
                expected: format!("sequence comparison for {}", operator),
                actual: Self::type_name(actual).to_string(),
            }),
            RuleOperator::IsEmpty => Ok(Self::is_empty(Some(actual))),
            RuleOperator::IsNotEmpty => Ok(!Self::is_empty(Some(actual))),
        }
    }

    /// 集合比较
    ///
    /// - in: 实际集合与期望集合有交集
    /// - not_in: 没有交集
    /// - all_in: 实际集合包含全部期望元素
    /// - not_all_in: 缺少至少一个期望元素
    /// - eq / neq: 两个集合元素相同（忽略顺序）
    fn evaluate_sequence(actual: &Value, operator: RuleOperator, expected: &Value) -> Result<bool> {
        let left = Self::as_array(actual)?;
        let right = Self::as_array(expected)?;

        let contains = |items: &[Value], item: &Value| items.iter().any(|v| Self::eq(v, item));

        match operator {
            RuleOperator::In => Ok(right.iter().any(|item| contains(left, item))),
            RuleOperator::NotIn => Ok(!right.iter().any(|item| contains(left, item))),
            RuleOperator::AllIn => Ok(right.iter().all(|item| contains(left, item))),
            RuleOperator::NotAllIn => Ok(!right.iter().all(|item| contains(left, item))),
            RuleOperator::Eq | RuleOperator::Neq => {
                let same = left.iter().all(|item| contains(right, item))
                    && right.iter().all(|item| contains(left, item));
                Ok(same == (operator == RuleOperator::Eq))
            }
            RuleOperator::Contains => Self::contains(actual, expected),
            RuleOperator::NotContains => Self::contains(actual, expected).map(|r| !r),
            _ => Err(RuleError::TypeMismatch {
                expected: format!("scalar comparison for {}", operator),
                actual: "sequence".to_string(),
            }),
        }
    }

    /// 判断值是否为空
    fn is_empty(value: Option<&Value>) -> bool {
        match value {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        }
    }

    /// 相等比较
    fn eq(actual: &Value, expected: &Value) -> bool {
        // 数值统一转为浮点数比较，避免 100 与 100.0 比较失败
        if let (Some(a), Some(b)) = (Self::as_f64(actual), Self::as_f64(expected)) {
            return Self::approx_eq(a, b);
        }

        actual == expected
    }

    /// 浮点相等，容差随数值量级放大
    fn approx_eq(a: f64, b: f64) -> bool {
        let scale = a.abs().max(b.abs()).max(1.0);
        (a - b).abs() <= 4.0 * f64::EPSILON * scale
    }

    /// 数值比较
    fn compare<F>(actual: &Value, expected: &Value, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let a = Self::as_number(actual)?;
        let b = Self::as_number(expected)?;
        Ok(cmp(a, b))
    }

    /// 标量包含于列表 (in)
    fn in_list(actual: &Value, expected: &Value) -> Result<bool> {
        Ok(Self::as_array(expected)?
            .iter()
            .any(|item| Self::eq(actual, item)))
    }

    /// 字符串/数组包含检查
    fn contains(actual: &Value, expected: &Value) -> Result<bool> {
        match actual {
            Value::String(s) => Ok(s.contains(Self::as_str(expected)?)),
            Value::Array(arr) => Ok(arr.iter().any(|item| Self::eq(item, expected))),
            _ => Err(RuleError::TypeMismatch {
                expected: "string or array".to_string(),
                actual: Self::type_name(actual).to_string(),
            }),
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    fn as_number(value: &Value) -> Result<f64> {
        Self::as_f64(value).ok_or_else(|| RuleError::TypeMismatch {
            expected: "number".to_string(),
            actual: Self::type_name(value).to_string(),
        })
    }

    fn as_str(value: &Value) -> Result<&str> {
        value.as_str().ok_or_else(|| RuleError::TypeMismatch {
            expected: "string".to_string(),
            actual: Self::type_name(value).to_string(),
        })
    }

    fn as_array(value: &Value) -> Result<&[Value]> {
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| RuleError::TypeMismatch {
                expected: "array".to_string(),
                actual: Self::type_name(value).to_string(),
            })
    }

    /// 获取值的类型名称
    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
