use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use regex::Regex;
use tracing::warn;

use crate::matching::fields;
use crate::proxy::context::RequestContext;
use crate::rules::{Condition, ConditionLeaf, Logic, Operator};

/// Evaluate a condition list under the given logic with short-circuit:
/// `and` fails on the first false child, `or` succeeds on the first true
/// one. An empty list matches under `and` and does not under `or`.
pub fn evaluate(conditions: &[Condition], logic: Logic, ctx: &RequestContext) -> bool {
    match logic {
        Logic::And => conditions.iter().all(|c| eval_condition(c, ctx)),
        Logic::Or => conditions.iter().any(|c| eval_condition(c, ctx)),
    }
}

fn eval_condition(condition: &Condition, ctx: &RequestContext) -> bool {
    match condition {
        Condition::Group(group) => evaluate(&group.conditions, group.logic, ctx),
        Condition::Leaf(leaf) => eval_leaf(leaf, ctx),
    }
}

/// Leaf evaluation never fails: structural problems (unknown field or
/// operator, invalid regex, malformed CIDR) degrade to "does not match"
/// with a warning so policy bugs cannot take the pipeline down.
fn eval_leaf(leaf: &ConditionLeaf, ctx: &RequestContext) -> bool {
    let Some(field_value) = fields::resolve(ctx, &leaf.field) else {
        return false;
    };
    let operand = fields::operand_as_string(&leaf.value);

    match leaf.operator {
        Operator::Eq => {
            if leaf.field == "clientIP" && operand.contains('/') {
                cidr_contains(&operand, &field_value)
            } else {
                field_value == operand
            }
        }
        Operator::Ne => field_value != operand,
        Operator::Gt => numeric(&field_value, &operand, |a, b| a > b),
        Operator::Ge => numeric(&field_value, &operand, |a, b| a >= b),
        Operator::Lt => numeric(&field_value, &operand, |a, b| a < b),
        Operator::Le => numeric(&field_value, &operand, |a, b| a <= b),
        Operator::Contains => field_value.contains(&operand),
        Operator::NotContains => !field_value.contains(&operand),
        Operator::StartsWith => field_value.starts_with(&operand),
        Operator::EndsWith => field_value.ends_with(&operand),
        Operator::Matches => match Regex::new(&operand) {
            Ok(re) => re.is_match(&field_value),
            Err(e) => {
                warn!(pattern = %operand, error = %e, "invalid regex in condition");
                false
            }
        },
        Operator::Unknown => {
            warn!(field = %leaf.field, "unknown operator in condition");
            false
        }
    }
}

fn numeric(a: &str, b: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) if a.is_finite() && b.is_finite() => cmp(a, b),
        _ => false,
    }
}

/// IPv4 CIDR membership for `clientIP eq "<net>/<prefix>"`. IPv6 operands
/// are not supported and evaluate to false.
fn cidr_contains(cidr: &str, ip: &str) -> bool {
    let net: Ipv4Net = match cidr.parse() {
        Ok(net) => net,
        Err(e) => {
            warn!(cidr, error = %e, "invalid CIDR operand on clientIP");
            return false;
        }
    };
    match ip.parse::<Ipv4Addr>() {
        Ok(addr) => net.contains(&addr),
        Err(_) => false,
    }
}
