use crate::error::BridgeError;
use crate::venue::{UserRole, VenuePort};

/// Signing key plus the trading account it acts for. When the key is an agent
/// key, every read and write is attributed to the master account while the
/// agent keeps signing.
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub signer_addr: String,
    pub master_addr: String,
    pub is_agent: bool,
}

/// Resolves the signing address against the venue's role registry. Cached by
/// the caller for the process lifetime; re-run only on key rotation or
/// environment switch.
pub async fn resolve(venue: &dyn VenuePort, signer_addr: &str) -> Result<ResolvedAccount, BridgeError> {
    let role = venue
        .user_role(signer_addr)
        .await
        .map_err(|e| BridgeError::Connectivity(format!("user role lookup failed: {e}")))?;

    match role {
        UserRole::Master => Ok(ResolvedAccount {
            signer_addr: signer_addr.to_string(),
            master_addr: signer_addr.to_string(),
            is_agent: false,
        }),
        UserRole::Agent { master } => {
            tracing::info!(signer = signer_addr, master = %master, "agent_key_resolved_to_master");
            Ok(ResolvedAccount {
                signer_addr: signer_addr.to_string(),
                master_addr: master,
                is_agent: true,
            })
        }
        UserRole::Unknown => Err(BridgeError::Configuration(format!(
            "venue reports unknown role for configured key address {signer_addr}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
