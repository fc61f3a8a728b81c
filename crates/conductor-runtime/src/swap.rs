use conductor_protocol::{RuntimeProfile, SwapMode, SwapPlan, SwapTier};

fn tier_supported(tier: SwapTier, from: &RuntimeProfile, to: &RuntimeProfile) -> bool {
    match tier {
        SwapTier::Hot => from.hot_capable() && to.hot_capable(),
        SwapTier::Warm => from.warm_capable() && to.warm_capable(),
        SwapTier::Cold => true,
    }
}

fn step_down_reason(tier: SwapTier, next: SwapTier) -> String {
    match tier {
        SwapTier::Hot => format!(
            "Requested hot swap but one/both modules cannot snapshot/restore; using {next} swap."
        ),
        _ => format!("Requested {tier} swap but {tier} unsupported; using {next} swap."),
    }
}

/// Highest continuity tier both profiles support, with narration.
///
/// `Auto` picks the best mutual tier. An explicit request steps down one tier
/// at a time until a supported tier is found, recording each step.
pub fn resolve_swap_plan(
    from: &RuntimeProfile,
    to: &RuntimeProfile,
    requested: SwapMode,
) -> SwapPlan {
    let mut reasons = Vec::new();

    let Some(wanted) = requested.tier() else {
        let resolved = if tier_supported(SwapTier::Hot, from, to) {
            reasons.push("Both modules advertise hot swap and snapshot/restore tools.".to_owned());
            SwapTier::Hot
        } else if tier_supported(SwapTier::Warm, from, to) {
            reasons.push("Hot swap not available; both modules support warm swap.".to_owned());
            SwapTier::Warm
        } else {
            reasons.push(
                "Falling back to cold swap due to incompatible runtime capabilities.".to_owned(),
            );
            SwapTier::Cold
        };
        return SwapPlan {
            requested,
            resolved,
            reasons,
            fallback_used: resolved != SwapTier::Hot,
        };
    };

    let mut resolved = wanted;
    while !tier_supported(resolved, from, to) {
        let Some(next) = resolved.step_down() else {
            break;
        };
        reasons.push(step_down_reason(resolved, next));
        resolved = next;
    }
    if reasons.is_empty() {
        reasons.push(format!("Swap mode {resolved} is supported by both modules."));
    }

    SwapPlan {
        requested,
        resolved,
        reasons,
        fallback_used: resolved != wanted,
    }
}
