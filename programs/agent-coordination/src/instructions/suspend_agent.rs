//! Suspend an agent (protocol authority only)

use crate::errors::CoordinationError;
use crate::events::AgentSuspended;
use crate::state::{AgentRegistration, AgentStatus, ProtocolConfig};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct SuspendAgent<'info> {
    #[account(
        mut,
        seeds = [b"agent", agent.agent_id.as_ref()],
        bump = agent.bump
    )]
    pub agent: Account<'info, AgentRegistration>,

    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump,
        has_one = authority @ CoordinationError::Unauthorized
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    pub authority: Signer<'info>,
}

/// Open claims stay with the agent; only new claims and votes are blocked.
pub fn suspend(agent: &mut AgentRegistration) -> Result<()> {
    require!(
        agent.status != AgentStatus::Suspended,
        CoordinationError::AgentSuspended
    );
    agent.status = AgentStatus::Suspended;
    Ok(())
}

pub fn handler(ctx: Context<SuspendAgent>) -> Result<()> {
    let agent = &mut ctx.accounts.agent;
    suspend(agent)?;

    emit!(AgentSuspended {
        agent_id: agent.agent_id,
        authority: ctx.accounts.authority.key(),
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    #[test]
    fn test_suspend_from_any_live_status() {
        for status in [AgentStatus::Inactive, AgentStatus::Active, AgentStatus::Busy] {
            let mut agent = AgentRegistration {
                status,
                ..AgentRegistration::default()
            };
            suspend(&mut agent).unwrap();
            assert_eq!(agent.status, AgentStatus::Suspended);
        }
    }

    #[test]
    fn test_suspend_twice_fails() {
        let mut agent = AgentRegistration {
            status: AgentStatus::Suspended,
            ..AgentRegistration::default()
        };
        assert!(error_matches(
            &suspend(&mut agent).unwrap_err(),
            CoordinationError::AgentSuspended
        ));
    }
}
