//! Cancel a task and refund the creator

use crate::errors::CoordinationError;
use crate::events::TaskCancelled;
use crate::instructions::claim_accounts::release_claimants;
use crate::instructions::lamport_transfer::{transfer_lamports, EscrowPayout};
use crate::state::{Task, TaskEscrow, TaskStatus, TaskType};
use anchor_lang::prelude::*;

/// remaining_accounts: one writable `(claim, worker_agent)` pair per claim on the task
#[derive(Accounts)]
pub struct CancelTask<'info> {
    #[account(
        mut,
        seeds = [b"task", task.creator.as_ref(), task.task_id.as_ref()],
        bump = task.bump,
        has_one = creator @ CoordinationError::Unauthorized
    )]
    pub task: Account<'info, Task>,

    #[account(
        mut,
        seeds = [b"escrow", task.key().as_ref()],
        bump = escrow.bump
    )]
    pub escrow: Account<'info, TaskEscrow>,

    #[account(mut)]
    pub creator: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Cancels the task and computes the refund of everything not yet distributed.
///
/// Open tasks can always be cancelled. InProgress tasks only once their
/// deadline has passed. `escrow.distributed` is left as is.
pub fn cancel(task: &mut Task, escrow: &mut TaskEscrow, now: i64) -> Result<EscrowPayout> {
    let can_cancel = match task.status {
        TaskStatus::Open => true,
        TaskStatus::InProgress => task.is_expired(now),
        _ => false,
    };
    require!(can_cancel, CoordinationError::TaskNotCancellable);
    require!(!escrow.is_closed, CoordinationError::EscrowClosed);

    let refund = escrow.remaining()?;

    task.status = TaskStatus::Cancelled;
    escrow.is_closed = true;

    Ok(EscrowPayout::refund(refund))
}

pub fn handler(ctx: Context<CancelTask>) -> Result<()> {
    let clock = Clock::get()?;
    let task_key = ctx.accounts.task.key();

    let payout = cancel(
        &mut ctx.accounts.task,
        &mut ctx.accounts.escrow,
        clock.unix_timestamp,
    )?;

    transfer_lamports(
        &ctx.accounts.escrow.to_account_info(),
        &ctx.accounts.creator.to_account_info(),
        payout.to_creator,
    )?;

    let task = &ctx.accounts.task;
    let released_workers = release_claimants(
        ctx.remaining_accounts,
        task_key,
        task.task_type == TaskType::Exclusive,
        task.current_workers as usize,
        None,
        clock.unix_timestamp,
    )?;

    emit!(TaskCancelled {
        task_id: task.task_id,
        creator: task.creator,
        refund_amount: payout.to_creator,
        released_workers,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
