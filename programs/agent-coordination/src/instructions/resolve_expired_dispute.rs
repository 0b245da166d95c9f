//! Expire a dispute whose voting window closed without quorum

use crate::errors::CoordinationError;
use crate::events::DisputeExpired;
use crate::instructions::dispute_helpers::expire_dispute;
use crate::state::{Dispute, ProtocolConfig, Task};
use anchor_lang::prelude::*;

/// Callable by anyone; the task goes back to InProgress.
#[derive(Accounts)]
pub struct ResolveExpiredDispute<'info> {
    #[account(
        mut,
        seeds = [b"dispute", dispute.dispute_id.as_ref()],
        bump = dispute.bump,
        has_one = task @ CoordinationError::TaskNotFound
    )]
    pub dispute: Account<'info, Dispute>,

    #[account(
        mut,
        seeds = [b"task", task.creator.as_ref(), task.task_id.as_ref()],
        bump = task.bump
    )]
    pub task: Account<'info, Task>,

    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    pub caller: Signer<'info>,
}

pub fn handler(ctx: Context<ResolveExpiredDispute>) -> Result<()> {
    let clock = Clock::get()?;
    let dispute = &mut ctx.accounts.dispute;
    let task = &mut ctx.accounts.task;

    expire_dispute(
        dispute,
        task,
        ctx.accounts.protocol_config.dispute_threshold,
        clock.unix_timestamp,
    )?;

    emit!(DisputeExpired {
        dispute_id: dispute.dispute_id,
        task_id: task.task_id,
        votes_for: dispute.votes_for,
        votes_against: dispute.votes_against,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
