//! Rule expressions, written in CEL.
//!
//! Variables available to an expression:
//!
//! | name         | type            |
//! |--------------|-----------------|
//! | `pointVal`   | point value     |
//! | `pointAttr`  | string          |
//! | `pointTS`    | int, unix secs  |
//! | `deviceTags` | list of strings |
//!
//! e.g. `pointAttr == "temp_c" && pointVal > 30.0`

use std::sync::Arc;

use cel_interpreter::{Context, Program, Value as CelValue};
use sensa_core::{DataPoint, Device, Value};

#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("compile: {0}")]
    Compile(String),
    #[error("execute: {0}")]
    Execute(String),
    #[error("expression returned {0}, expected a bool")]
    NotBool(String),
}

fn cel_value(value: Value) -> CelValue {
    match value {
        Value::Int(v) => CelValue::Int(i64::from(v)),
        Value::Float(v) => CelValue::Float(v),
        Value::Str(v) => CelValue::String(Arc::new(v)),
        Value::Bool(v) => CelValue::Bool(v),
        Value::Bytes(v) => CelValue::Bytes(Arc::new(v)),
        _ => CelValue::Null,
    }
}

/// Evaluate `expr` against a point of `device`.
pub fn evaluate(expr: &str, point: &DataPoint, device: &Device) -> Result<bool, ExprError> {
    let program = Program::compile(expr).map_err(|e| ExprError::Compile(e.to_string()))?;

    let tags: Vec<CelValue> = device
        .tags
        .iter()
        .map(|tag| CelValue::String(Arc::new(tag.clone())))
        .collect();

    let mut context = Context::default();
    context.add_variable_from_value("pointVal", cel_value(point.value()));
    context.add_variable_from_value("pointAttr", CelValue::String(Arc::new(point.attr.clone())));
    context.add_variable_from_value(
        "pointTS",
        CelValue::Int(point.ts.as_ref().map_or(0, |ts| ts.seconds)),
    );
    context.add_variable_from_value("deviceTags", CelValue::List(Arc::new(tags)));

    match program.execute(&context) {
        Ok(CelValue::Bool(result)) => Ok(result),
        Ok(other) => Err(ExprError::NotBool(format!("{other:?}"))),
        Err(e) => Err(ExprError::Execute(e.to_string())),
    }
}
