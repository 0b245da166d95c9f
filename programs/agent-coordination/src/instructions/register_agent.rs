//! Register a new agent on-chain

use crate::errors::CoordinationError;
use crate::events::AgentRegistered;
use crate::state::{AgentRegistration, AgentStatus, ProtocolConfig};
use anchor_lang::prelude::*;

use super::constants::INITIAL_REPUTATION;
use super::validation::{validate_capabilities, validate_endpoint, validate_metadata_uri};

#[derive(Accounts)]
#[instruction(agent_id: [u8; 32])]
pub struct RegisterAgent<'info> {
    /// A live registration at this address surfaces as `AlreadyRegistered`
    #[account(
        init_if_needed,
        payer = authority,
        space = AgentRegistration::SIZE,
        seeds = [b"agent", agent_id.as_ref()],
        bump
    )]
    pub agent: Account<'info, AgentRegistration>,

    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Validates the registration and writes a fresh Active record.
#[allow(clippy::too_many_arguments)]
pub fn init_agent(
    agent: &mut AgentRegistration,
    agent_id: [u8; 32],
    authority: Pubkey,
    capabilities: u64,
    endpoint: String,
    metadata_uri: Option<String>,
    bump: u8,
    now: i64,
) -> Result<()> {
    require!(!agent.is_registered(), CoordinationError::AlreadyRegistered);
    require!(
        agent_id == authority.to_bytes(),
        CoordinationError::InvalidAgentId
    );
    validate_capabilities(capabilities)?;
    validate_endpoint(&endpoint)?;
    let metadata_uri = metadata_uri.unwrap_or_default();
    validate_metadata_uri(&metadata_uri)?;

    agent.agent_id = agent_id;
    agent.authority = authority;
    agent.capabilities = capabilities;
    agent.status = AgentStatus::Active;
    agent.endpoint = endpoint;
    agent.metadata_uri = metadata_uri;
    agent.registered_at = now;
    agent.last_active = now;
    agent.tasks_completed = 0;
    agent.total_earned = 0;
    agent.reputation = INITIAL_REPUTATION;
    agent.active_tasks = 0;
    agent.stake = 0;
    agent.bump = bump;
    Ok(())
}

pub fn increment_total_agents(config: &mut ProtocolConfig) -> Result<()> {
    config.total_agents = config
        .total_agents
        .checked_add(1)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    Ok(())
}

pub fn handler(
    ctx: Context<RegisterAgent>,
    agent_id: [u8; 32],
    capabilities: u64,
    endpoint: String,
    metadata_uri: Option<String>,
) -> Result<()> {
    let clock = Clock::get()?;
    let authority = ctx.accounts.authority.key();
    let agent = &mut ctx.accounts.agent;

    init_agent(
        agent,
        agent_id,
        authority,
        capabilities,
        endpoint,
        metadata_uri,
        ctx.bumps.agent,
        clock.unix_timestamp,
    )?;
    increment_total_agents(&mut ctx.accounts.protocol_config)?;

    emit!(AgentRegistered {
        agent_id,
        authority,
        capabilities,
        endpoint: agent.endpoint.clone(),
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;
    use crate::state::capability;

    const AUTHORITY: Pubkey = Pubkey::new_from_array([8u8; 32]);

    fn register(agent: &mut AgentRegistration, capabilities: u64, endpoint: &str) -> Result<()> {
        init_agent(
            agent,
            AUTHORITY.to_bytes(),
            AUTHORITY,
            capabilities,
            endpoint.to_string(),
            Some("ipfs://meta".to_string()),
            253,
            1_700_000_000,
        )
    }

    #[test]
    fn test_register_defaults() {
        let mut agent = AgentRegistration::default();
        register(&mut agent, capability::COMPUTE, "https://agent.example").unwrap();

        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.reputation, 100);
        assert_eq!(agent.active_tasks, 0);
        assert_eq!(agent.stake, 0);
        assert_eq!(agent.tasks_completed, 0);
        assert_eq!(agent.registered_at, 1_700_000_000);
        assert_eq!(agent.metadata_uri, "ipfs://meta");
        assert_eq!(agent.bump, 253);
    }

    #[test]
    fn test_register_twice_fails() {
        let mut agent = AgentRegistration::default();
        register(&mut agent, capability::COMPUTE, "https://agent.example").unwrap();
        let err = register(&mut agent, capability::STORAGE, "https://other.example").unwrap_err();
        assert!(error_matches(&err, CoordinationError::AlreadyRegistered));
        assert_eq!(agent.capabilities, capability::COMPUTE);
    }

    #[test]
    fn test_register_validation() {
        let mut agent = AgentRegistration::default();
        assert!(error_matches(
            &register(&mut agent, 0, "https://agent.example").unwrap_err(),
            CoordinationError::InvalidCapabilities
        ));
        assert!(error_matches(
            &register(&mut agent, capability::COMPUTE, "").unwrap_err(),
            CoordinationError::InvalidEndpoint
        ));
        assert!(!agent.is_registered());
    }

    #[test]
    fn test_agent_id_must_match_authority() {
        let mut agent = AgentRegistration::default();
        let err = init_agent(
            &mut agent,
            [1u8; 32],
            AUTHORITY,
            capability::COMPUTE,
            "https://agent.example".to_string(),
            None,
            0,
            0,
        )
        .unwrap_err();
        assert!(error_matches(&err, CoordinationError::InvalidAgentId));
    }
}
