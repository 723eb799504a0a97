//! Alarm subject and body rendering.
//!
//! Templates see `point`, `rule` and `device`, e.g.
//! `{{ device.name }}: {{ point.attr }} is {{ point.value }}`.
//! Undefined variables are errors.

use minijinja::{Environment, UndefinedBehavior, context};
use sensa_core::{Alarm, DataPoint, Device, Rule, Value, time};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
#[error("template {field}: {source}")]
pub struct TemplateError {
    field: &'static str,
    #[source]
    source: minijinja::Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

#[derive(Serialize)]
struct PointView<'a> {
    uniq_id: &'a str,
    attr: &'a str,
    value: Value,
    ts: Option<String>,
    trace_id: &'a str,
}

#[derive(Serialize)]
struct RuleView<'a> {
    id: &'a str,
    name: &'a str,
    attr: &'a str,
    expr: &'a str,
}

#[derive(Serialize)]
struct DeviceView<'a> {
    id: &'a str,
    uniq_id: &'a str,
    name: &'a str,
    status: &'static str,
    tags: &'a [String],
}

pub struct Templates {
    env: Environment<'static>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

impl Templates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    pub fn render(
        &self,
        alarm: &Alarm,
        point: &DataPoint,
        rule: &Rule,
        device: &Device,
    ) -> Result<Rendered, TemplateError> {
        let ctx = context! {
            point => PointView {
                uniq_id: &point.uniq_id,
                attr: &point.attr,
                value: point.value(),
                ts: point
                    .ts
                    .as_ref()
                    .and_then(time::from_proto)
                    .map(|ts| ts.to_string()),
                trace_id: &point.trace_id,
            },
            rule => RuleView {
                id: &rule.id,
                name: &rule.name,
                attr: &rule.attr,
                expr: &rule.expr,
            },
            device => DeviceView {
                id: &device.id,
                uniq_id: &device.uniq_id,
                name: &device.name,
                status: device.status().as_str(),
                tags: &device.tags,
            },
        };

        let subject = self
            .env
            .render_str(&alarm.subject_template, &ctx)
            .map_err(|source| TemplateError {
                field: "subject",
                source,
            })?;
        let body = self
            .env
            .render_str(&alarm.body_template, &ctx)
            .map_err(|source| TemplateError {
                field: "body",
                source,
            })?;
        Ok(Rendered { subject, body })
    }
}
