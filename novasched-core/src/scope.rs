use std::collections::HashMap;

use novasched_domain::Scope;

/// What a `Ctx` must expose for scope gating to evaluate the
/// `HypervisorTypeIn` predicate. Anything the scope predicates don't need
/// stays out of this trait on purpose — it grows only when a new predicate
/// is added to [`Scope`].
pub trait HypervisorFamilyOf {
    /// Normalized hypervisor family for this request, e.g. `"vmware"` or
    /// `"kvm"`. `None` when the request's flavor carries no
    /// `hypervisor_type` extra-spec — `HypervisorTypeIn` then evaluates to
    /// `false` rather than erroring, per the fail-closed-for-step rule.
    fn hypervisor_family(&self) -> Option<&str>;
}

/// Everything [`evaluate_scope`] needs: the request-shaped context plus a
/// lookup from candidate host name to its known traits. The trait lookup is
/// supplied by the caller (sourced from a Knowledge snapshot) rather than
/// owned by the context type, since it's fleet-wide data, not per-request
/// data.
pub struct ScopeInput<'a, Ctx> {
    pub ctx: &'a Ctx,
    pub host_traits: &'a HashMap<String, Vec<String>>,
}

/// Evaluates whether a plugin configured with `scope` should run at all for
/// this request. Missing data (unknown hypervisor family, no host carries
/// any trait) evaluates to `false` — a scope gate never panics and never
/// treats "don't know" as "yes, run it".
pub fn evaluate_scope<Ctx: HypervisorFamilyOf>(scope: &Scope, input: &ScopeInput<'_, Ctx>) -> bool {
    match scope {
        Scope::HypervisorTypeIn { values } => match input.ctx.hypervisor_family() {
            Some(family) => values.iter().any(|v| v.eq_ignore_ascii_case(family)),
            None => false,
        },
        Scope::AnyOfTraitInfixes { infixes } => input
            .host_traits
            .values()
            .any(|traits| traits.iter().any(|t| infixes.iter().any(|infix| t.contains(infix.as_str())))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx(Option<&'static str>);
    impl HypervisorFamilyOf for Ctx {
        fn hypervisor_family(&self) -> Option<&str> {
            self.0
        }
    }

    #[test]
    fn hypervisor_type_in_matches_case_insensitively() {
        let ctx = Ctx(Some("VMware"));
        let traits = HashMap::new();
        let input = ScopeInput { ctx: &ctx, host_traits: &traits };
        let scope = Scope::HypervisorTypeIn { values: vec!["vmware".to_string()] };
        assert!(evaluate_scope(&scope, &input));
    }

    #[test]
    fn missing_hypervisor_family_is_false_not_error() {
        let ctx = Ctx(None);
        let traits = HashMap::new();
        let input = ScopeInput { ctx: &ctx, host_traits: &traits };
        let scope = Scope::HypervisorTypeIn { values: vec!["vmware".to_string()] };
        assert!(!evaluate_scope(&scope, &input));
    }

    #[test]
    fn trait_infix_matches_substring_not_exact() {
        let ctx = Ctx(None);
        let mut traits = HashMap::new();
        traits.insert("host-a".to_string(), vec!["CUSTOM_GPU_A100".to_string()]);
        let input = ScopeInput { ctx: &ctx, host_traits: &traits };
        let scope = Scope::AnyOfTraitInfixes { infixes: vec!["GPU".to_string()] };
        assert!(evaluate_scope(&scope, &input));
    }
}
