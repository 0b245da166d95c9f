//! Lift an agent's suspension (protocol authority only)

use crate::errors::CoordinationError;
use crate::events::AgentUnsuspended;
use crate::state::{AgentRegistration, AgentStatus, ProtocolConfig};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct UnsuspendAgent<'info> {
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

/// An agent still holding its Exclusive claim goes back to Busy.
pub fn unsuspend(agent: &mut AgentRegistration) -> Result<()> {
    require!(
        agent.status == AgentStatus::Suspended,
        CoordinationError::AgentNotSuspended
    );
    agent.status = if agent.holds_exclusive {
        AgentStatus::Busy
    } else {
        AgentStatus::Active
    };
    Ok(())
}

pub fn handler(ctx: Context<UnsuspendAgent>) -> Result<()> {
    let agent = &mut ctx.accounts.agent;
    unsuspend(agent)?;

    emit!(AgentUnsuspended {
        agent_id: agent.agent_id,
        authority: ctx.accounts.authority.key(),
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
