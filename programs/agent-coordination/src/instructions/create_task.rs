//! Create a new task with reward escrow

use crate::events::TaskCreated;
use crate::state::{ProtocolConfig, Task, TaskEscrow};
use anchor_lang::prelude::*;
use anchor_lang::system_program;

use super::task_init_helpers::{
    increment_total_tasks, init_escrow_fields, init_task_fields, validate_task_params, TaskParams,
};

#[derive(Accounts)]
#[instruction(task_id: [u8; 32])]
pub struct CreateTask<'info> {
    #[account(
        init,
        payer = creator,
        space = Task::SIZE,
        seeds = [b"task", creator.key().as_ref(), task_id.as_ref()],
        bump
    )]
    pub task: Account<'info, Task>,

    #[account(
        init,
        payer = creator,
        space = TaskEscrow::SIZE,
        seeds = [b"escrow", task.key().as_ref()],
        bump
    )]
    pub escrow: Account<'info, TaskEscrow>,

    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    /// The creator who pays for and owns the task
    #[account(mut)]
    pub creator: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Creates a new task and moves `reward_amount` lamports into its escrow.
///
/// # Parameters
/// - `task_type`: 0=Exclusive, 1=Collaborative, 2=Competitive
#[allow(clippy::too_many_arguments)]
pub fn handler(
    ctx: Context<CreateTask>,
    task_id: [u8; 32],
    required_capabilities: u64,
    description: [u8; 64],
    reward_amount: u64,
    max_workers: u8,
    deadline: i64,
    task_type: u8,
) -> Result<()> {
    let clock = Clock::get()?;
    let params = TaskParams {
        task_id,
        required_capabilities,
        description,
        reward_amount,
        max_workers,
        deadline,
        task_type,
    };
    let task_type = validate_task_params(&params, clock.unix_timestamp)?;

    system_program::transfer(
        CpiContext::new(
            ctx.accounts.system_program.to_account_info(),
            system_program::Transfer {
                from: ctx.accounts.creator.to_account_info(),
                to: ctx.accounts.escrow.to_account_info(),
            },
        ),
        reward_amount,
    )?;

    let task_key = ctx.accounts.task.key();
    let escrow_key = ctx.accounts.escrow.key();
    let creator = ctx.accounts.creator.key();
    let config = &mut ctx.accounts.protocol_config;

    init_task_fields(
        &mut ctx.accounts.task,
        &params,
        task_type,
        creator,
        escrow_key,
        ctx.bumps.task,
        config.protocol_fee_bps,
        clock.unix_timestamp,
    );
    init_escrow_fields(
        &mut ctx.accounts.escrow,
        task_key,
        reward_amount,
        ctx.bumps.escrow,
    );
    increment_total_tasks(config)?;

    emit!(TaskCreated {
        task_id,
        creator,
        required_capabilities,
        reward_amount,
        max_workers,
        task_type: task_type as u8,
        deadline,
        timestamp: clock.unix_timestamp,
    });

    Ok(())
}
