pub mod cookie;
pub mod limits;
pub mod middleware;
pub mod usage;

pub use cookie::CookieSigner;
pub use limits::{Tier, TierLimits, UserPermissions};
pub use middleware::{check_lesson_limit, identity_middleware, resolve_tier, Identity};
pub use usage::{create_shared_tracker, SharedUsageTracker, UsageSubject};
