//! Update an existing agent's registration

use crate::errors::CoordinationError;
use crate::events::AgentUpdated;
use crate::state::AgentRegistration;
use anchor_lang::prelude::*;

use super::validation::{validate_capabilities, validate_endpoint, validate_metadata_uri};

#[derive(Accounts)]
pub struct UpdateAgent<'info> {
    #[account(
        mut,
        seeds = [b"agent", agent.agent_id.as_ref()],
        bump = agent.bump,
        has_one = authority @ CoordinationError::Unauthorized
    )]
    pub agent: Account<'info, AgentRegistration>,

    pub authority: Signer<'info>,
}

/// Applies the owner-editable fields. Status is not among them.
///
/// Every provided value is validated before anything is written.
pub fn apply_update(
    agent: &mut AgentRegistration,
    capabilities: Option<u64>,
    endpoint: Option<String>,
    metadata_uri: Option<String>,
    now: i64,
) -> Result<()> {
    if let Some(caps) = capabilities {
        validate_capabilities(caps)?;
    }
    if let Some(ep) = endpoint.as_deref() {
        validate_endpoint(ep)?;
    }
    if let Some(uri) = metadata_uri.as_deref() {
        validate_metadata_uri(uri)?;
    }

    if let Some(caps) = capabilities {
        agent.capabilities = caps;
    }
    if let Some(ep) = endpoint {
        agent.endpoint = ep;
    }
    if let Some(uri) = metadata_uri {
        agent.metadata_uri = uri;
    }
    agent.last_active = now;
    Ok(())
}

pub fn handler(
    ctx: Context<UpdateAgent>,
    capabilities: Option<u64>,
    endpoint: Option<String>,
    metadata_uri: Option<String>,
) -> Result<()> {
    let agent = &mut ctx.accounts.agent;
    let clock = Clock::get()?;

    apply_update(
        agent,
        capabilities,
        endpoint,
        metadata_uri,
        clock.unix_timestamp,
    )?;

    emit!(AgentUpdated {
        agent_id: agent.agent_id,
        capabilities: agent.capabilities,
        status: agent.status as u8,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;
    use crate::state::{capability, AgentStatus};

    fn registered() -> AgentRegistration {
        AgentRegistration {
            authority: Pubkey::new_from_array([3u8; 32]),
            capabilities: capability::COMPUTE,
            status: AgentStatus::Busy,
            endpoint: "https://old.example".to_string(),
            ..AgentRegistration::default()
        }
    }

    #[test]
    fn test_partial_update() {
        let mut agent = registered();
        apply_update(
            &mut agent,
            Some(capability::COMPUTE | capability::VERIFICATION),
            None,
            Some("ipfs://new".to_string()),
            77,
        )
        .unwrap();

        assert_eq!(
            agent.capabilities,
            capability::COMPUTE | capability::VERIFICATION
        );
        assert_eq!(agent.endpoint, "https://old.example");
        assert_eq!(agent.metadata_uri, "ipfs://new");
        assert_eq!(agent.last_active, 77);
        assert_eq!(agent.status, AgentStatus::Busy);
    }

    #[test]
    fn test_invalid_field_leaves_record_untouched() {
        let mut agent = registered();
        let err = apply_update(
            &mut agent,
            Some(capability::STORAGE),
            Some("not-a-url".to_string()),
            None,
            5,
        )
        .unwrap_err();

        assert!(error_matches(&err, CoordinationError::InvalidEndpoint));
        assert_eq!(agent.capabilities, capability::COMPUTE);
        assert_eq!(agent.last_active, 0);
    }

    #[test]
    fn test_undefined_capability_bits_rejected() {
        let mut agent = registered();
        let err = apply_update(&mut agent, Some(1 << 20), None, None, 0).unwrap_err();
        assert!(error_matches(&err, CoordinationError::InvalidCapabilities));
    }
}
