// [libs/core/metering/src/quota.rs]
/*!
 * Quota resolution and checking (spec §4.2 step 9). Counters live on
 * `ApiKeyRecord` itself (owned by the KeyStore); this module is stateless
 * — it resolves the effective limit (key -> group -> global) and checks
 * a would-be charge against the record's current counters.
 */

use paygate_model::key::QuotaOverride;

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalQuotaDefaults {
    pub daily_call_limit: u64,
    pub monthly_call_limit: u64,
    pub daily_credit_limit: i64,
    pub monthly_credit_limit: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct EffectiveQuota {
    pub daily_call_limit: u64,
    pub monthly_call_limit: u64,
    pub daily_credit_limit: i64,
    pub monthly_credit_limit: i64,
}

/// Resolves key -> group -> global precedence, dimension by dimension
/// (a key can override just the daily call limit and still inherit the
/// group's monthly credit limit).
pub fn resolve(key: Option<&QuotaOverride>, group: Option<&QuotaOverride>, global: GlobalQuotaDefaults) -> EffectiveQuota {
    fn pick<T: PartialEq + Default + Copy>(key_value: T, group_value: T, global_value: T) -> T {
        if key_value != T::default() {
            key_value
        } else if group_value != T::default() {
            group_value
        } else {
            global_value
        }
    }

    let key = key.cloned().unwrap_or_default();
    let group = group.cloned().unwrap_or_default();

    EffectiveQuota {
        daily_call_limit: pick(key.daily_call_limit, group.daily_call_limit, global.daily_call_limit),
        monthly_call_limit: pick(key.monthly_call_limit, group.monthly_call_limit, global.monthly_call_limit),
        daily_credit_limit: pick(key.daily_credit_limit, group.daily_credit_limit, global.daily_credit_limit),
        monthly_credit_limit: pick(key.monthly_credit_limit, group.monthly_credit_limit, global.monthly_credit_limit),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDimension {
    DailyCalls,
    MonthlyCalls,
    DailyCredits,
    MonthlyCredits,
}

impl QuotaDimension {
    pub fn as_reason_suffix(self) -> &'static str {
        match self {
            QuotaDimension::DailyCalls => "daily_calls",
            QuotaDimension::MonthlyCalls => "monthly_calls",
            QuotaDimension::DailyCredits => "daily_credits",
            QuotaDimension::MonthlyCredits => "monthly_credits",
        }
    }
}

/// Returns the first breached dimension, if any. `0` means unlimited.
pub fn check(
    effective: EffectiveQuota,
    current_daily_calls: u64,
    current_monthly_calls: u64,
    current_daily_credits: i64,
    current_monthly_credits: i64,
    price: i64,
) -> Option<QuotaDimension> {
    if effective.daily_call_limit != 0 && current_daily_calls + 1 > effective.daily_call_limit {
        return Some(QuotaDimension::DailyCalls);
    }
    if effective.monthly_call_limit != 0 && current_monthly_calls + 1 > effective.monthly_call_limit {
        return Some(QuotaDimension::MonthlyCalls);
    }
    if effective.daily_credit_limit != 0 && current_daily_credits + price > effective.daily_credit_limit {
        return Some(QuotaDimension::DailyCredits);
    }
    if effective.monthly_credit_limit != 0 && current_monthly_credits + price > effective.monthly_credit_limit {
        return Some(QuotaDimension::MonthlyCredits);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_override_takes_precedence_over_group_and_global() {
        let key = QuotaOverride { daily_call_limit: 5, ..Default::default() };
        let group = QuotaOverride { daily_call_limit: 50, monthly_call_limit: 500, ..Default::default() };
        let global = GlobalQuotaDefaults { daily_call_limit: 1000, monthly_call_limit: 1000, ..Default::default() };

        let effective = resolve(Some(&key), Some(&group), global);
        assert_eq!(effective.daily_call_limit, 5);
        assert_eq!(effective.monthly_call_limit, 500);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let effective = EffectiveQuota { daily_call_limit: 0, monthly_call_limit: 0, daily_credit_limit: 0, monthly_credit_limit: 0 };
        assert!(check(effective, 10_000, 10_000, 1_000_000, 1_000_000, 1).is_none());
    }

    #[test]
    fn breach_reports_first_violated_dimension() {
        let effective = EffectiveQuota { daily_call_limit: 3, monthly_call_limit: 0, daily_credit_limit: 0, monthly_credit_limit: 0 };
        assert_eq!(check(effective, 3, 0, 0, 0, 1), Some(QuotaDimension::DailyCalls));
    }
}
