//! Deregister an agent and reclaim its rent

use crate::errors::CoordinationError;
use crate::events::AgentDeregistered;
use crate::state::AgentRegistration;
use anchor_lang::prelude::*;

/// Once closed, a second call fails to load `agent` the same way it would
/// for an identity that never registered.
#[derive(Accounts)]
pub struct DeregisterAgent<'info> {
    #[account(
        mut,
        close = authority,
        seeds = [b"agent", agent.agent_id.as_ref()],
        bump = agent.bump,
        has_one = authority @ CoordinationError::Unauthorized
    )]
    pub agent: Account<'info, AgentRegistration>,

    #[account(mut)]
    pub authority: Signer<'info>,
}

pub fn check_deregister(agent: &AgentRegistration) -> Result<()> {
    require!(
        agent.active_tasks == 0,
        CoordinationError::ActiveTasksRemaining
    );
    Ok(())
}

pub fn handler(ctx: Context<DeregisterAgent>) -> Result<()> {
    let agent = &ctx.accounts.agent;
    check_deregister(agent)?;

    emit!(AgentDeregistered {
        agent_id: agent.agent_id,
        authority: agent.authority,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::error_matches;

    #[test]
    fn test_deregister_requires_no_active_tasks() {
        let mut agent = AgentRegistration {
            active_tasks: 1,
            ..AgentRegistration::default()
        };
        assert!(error_matches(
            &check_deregister(&agent).unwrap_err(),
            CoordinationError::ActiveTasksRemaining
        ));

        agent.active_tasks = 0;
        assert!(check_deregister(&agent).is_ok());
    }
}
