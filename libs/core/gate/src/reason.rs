// [libs/core/gate/src/reason.rs]
/*!
 * The fixed deny-reason vocabulary (spec §4.2, §7 item 1). Every
 * non-allow outcome of the cascade maps to exactly one of these; shadow
 * mode wraps the chosen reason as `shadow:<reason>` rather than minting
 * a new one.
 */

use paygate_metering::QuotaDimension;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MissingApiKey,
    InvalidApiKey,
    ApiKeyExpired,
    KeySuspended,
    IpNotAllowed,
    ToolNotAllowed,
    ToolDenied,
    RateLimited,
    ToolRateLimited,
    QuotaExceeded(QuotaDimension),
    SpendingLimitExceeded,
    InsufficientCredits,
    ApprovalRequired,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::MissingApiKey => write!(f, "missing_api_key"),
            DenyReason::InvalidApiKey => write!(f, "invalid_api_key"),
            DenyReason::ApiKeyExpired => write!(f, "api_key_expired"),
            DenyReason::KeySuspended => write!(f, "key_suspended"),
            DenyReason::IpNotAllowed => write!(f, "ip_not_allowed"),
            DenyReason::ToolNotAllowed => write!(f, "tool_not_allowed"),
            DenyReason::ToolDenied => write!(f, "tool_denied"),
            DenyReason::RateLimited => write!(f, "rate_limited"),
            DenyReason::ToolRateLimited => write!(f, "tool_rate_limited"),
            DenyReason::QuotaExceeded(dim) => write!(f, "quota_exceeded:{}", dim.as_reason_suffix()),
            DenyReason::SpendingLimitExceeded => write!(f, "spending_limit_exceeded"),
            DenyReason::InsufficientCredits => write!(f, "insufficient_credits"),
            DenyReason::ApprovalRequired => write!(f, "approval_required"),
        }
    }
}

impl DenyReason {
    pub fn shadowed(&self) -> String {
        format!("shadow:{self}")
    }
}
