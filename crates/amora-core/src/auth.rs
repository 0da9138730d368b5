use amora_types::api::AuthContext;
use amora_types::models::Capability;

use crate::error::{CoreError, Result};

/// Fail with `Forbidden` unless the caller's role grants `capability`.
pub fn require(ctx: &AuthContext, capability: Capability) -> Result<()> {
    if ctx.can(capability) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "role '{}' may not {:?}",
            ctx.role, capability
        )))
    }
}
