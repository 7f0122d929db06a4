//! Access-Control Gate
//!
//! Every mutating entry point of the writer calls [`authorize`] before it
//! reads or writes any ledger state. The gate only reads committed roles.

use crate::auth::CallerContext;
use crate::roles::RoleStore;
use crate::types::Role;
use crate::{Error, Result};

/// Allow the call if the caller holds `required`, else `Unauthorized`
pub fn authorize(roles: &RoleStore, caller: &CallerContext, required: Role) -> Result<()> {
    let identity = caller.identity();

    if roles.has_role(&identity, required)? {
        return Ok(());
    }

    tracing::warn!(
        caller = %identity.short(),
        required = %required,
        "Authorization denied"
    );

    Err(Error::Unauthorized {
        caller: identity,
        required,
    })
}
