//! Three-level configuration inheritance: rule, then owning frontend, then
//! the load-balancer instance. Evaluated independently per domain.

use crate::types::{CfgLevel, ConfigSource, ExtCr, RuleCtx};

/// Walk the chain with a per-domain accessor; the first non-absent value
/// wins and its origin record is reported for dedup keying.
pub fn resolve<'a, T, F>(ctx: &RuleCtx<'a>, accessor: F) -> Option<(&'a T, ConfigSource)>
where
    F: Fn(&'a ExtCr) -> Option<&'a T>,
{
    if let Some(v) = accessor(&ctx.rule.config) {
        return Some((v, ConfigSource::new(CfgLevel::Rule, &ctx.rule.name)));
    }
    if let Some(v) = accessor(&ctx.ft.config) {
        return Some((v, ConfigSource::new(CfgLevel::Frontend, &ctx.ft.name)));
    }
    if let Some(v) = accessor(&ctx.alb.config.ext) {
        return Some((v, ConfigSource::new(CfgLevel::Alb, &ctx.alb.name)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::timeout::TimeoutCr;
    use crate::types::{Alb, Frontend, Rule};

    fn timeout(seconds: &str) -> TimeoutCr {
        TimeoutCr { proxy_read_timeout: seconds.to_string(), ..Default::default() }
    }

    #[test]
    fn test_rule_level_beats_frontend_and_alb() {
        let mut rule = Rule { name: "r1".into(), ..Default::default() };
        rule.config.timeout = Some(timeout("1"));
        let mut ft = Frontend { name: "ft-1".into(), ..Default::default() };
        ft.config.timeout = Some(timeout("2"));
        let mut alb = Alb { name: "alb-1".into(), ..Default::default() };
        alb.config.ext.timeout = Some(timeout("3"));

        let ctx = RuleCtx::new(&rule, &ft, &alb);
        let (value, source) = resolve(&ctx, |c| c.timeout.as_ref()).unwrap();
        assert_eq!(value.proxy_read_timeout, "1");
        assert_eq!(source, ConfigSource::new(CfgLevel::Rule, "r1"));
    }

    #[test]
    fn test_alb_level_visible_when_lower_levels_absent() {
        let rule = Rule { name: "r1".into(), ..Default::default() };
        let ft = Frontend { name: "ft-1".into(), ..Default::default() };
        let mut alb = Alb { name: "alb-1".into(), ..Default::default() };
        alb.config.ext.timeout = Some(timeout("3"));

        let ctx = RuleCtx::new(&rule, &ft, &alb);
        let (value, source) = resolve(&ctx, |c| c.timeout.as_ref()).unwrap();
        assert_eq!(value.proxy_read_timeout, "3");
        assert_eq!(source.level, CfgLevel::Alb);
    }

    #[test]
    fn test_absent_everywhere_is_none() {
        let rule = Rule::default();
        let ft = Frontend::default();
        let alb = Alb::default();
        let ctx = RuleCtx::new(&rule, &ft, &alb);
        assert!(resolve(&ctx, |c| c.timeout.as_ref()).is_none());
    }
}
