use tracing::{debug, info, warn};

use crate::matching::evaluator::evaluate;
use crate::proxy::context::RequestContext;
use crate::rules::{validate_rule, Action, Rule, Ruleset};

/// Outcome of walking the ruleset: the rule that applies to this request
/// and the action its matching block selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub action: &'a Action,
}

/// Walk rules in order. Terminal actions (`allow`, `block`, `rateLimit`,
/// `customResponse`) win immediately; observational ones (`log`,
/// `simulate`) are remembered and the walk continues, so a later terminal
/// rule can still take effect. When nothing terminal fires, the last
/// recorded else fallback wins over the last observational match.
///
/// Structurally invalid rules are skipped with a warning; the ruleset
/// behaves as if they were removed.
pub fn match_rules<'a>(ruleset: &'a Ruleset, ctx: &RequestContext) -> Option<RuleMatch<'a>> {
    let mut last_observational: Option<RuleMatch<'a>> = None;
    let mut last_else: Option<RuleMatch<'a>> = None;

    for rule in &ruleset.rules {
        if let Err(reason) = validate_rule(rule) {
            warn!(rule = %rule.name, %reason, "skipping malformed rule");
            continue;
        }

        let mut rule_matched = false;
        let initial = &rule.initial_match;
        if evaluate(&initial.conditions, initial.logic, ctx) {
            rule_matched = true;
            if initial.action.is_terminal() {
                debug!(rule = %rule.name, "terminal match");
                return Some(RuleMatch { rule, action: &initial.action });
            }
            record_observational(rule, &initial.action, ctx);
            last_observational = Some(RuleMatch { rule, action: &initial.action });
        } else {
            for block in &rule.else_if_actions {
                if evaluate(&block.conditions, block.logic, ctx) {
                    rule_matched = true;
                    if block.action.is_terminal() {
                        debug!(rule = %rule.name, "terminal else-if match");
                        return Some(RuleMatch { rule, action: &block.action });
                    }
                    record_observational(rule, &block.action, ctx);
                    last_observational = Some(RuleMatch { rule, action: &block.action });
                    break;
                }
            }
        }

        if !rule_matched {
            if let Some(else_action) = &rule.else_action {
                last_else = Some(RuleMatch { rule, action: else_action });
            }
        }
    }

    last_else.or(last_observational)
}

/// Observational matches are reported as they are seen, so a log rule
/// leaves a record even when a later terminal rule decides the response.
fn record_observational(rule: &Rule, action: &Action, ctx: &RequestContext) {
    if matches!(action, Action::Log) {
        info!(
            rule = %rule.name,
            method = %ctx.method,
            path = %ctx.uri.path(),
            client_ip = %ctx.client_ip(),
            "log rule matched"
        );
    }
}
