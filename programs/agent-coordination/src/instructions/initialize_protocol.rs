//! Initialize protocol configuration

use crate::errors::CoordinationError;
use crate::events::ProtocolInitialized;
use crate::instructions::constants::MAX_PROTOCOL_FEE_BPS;
use crate::state::ProtocolConfig;
use anchor_lang::prelude::*;

/// The singleton lives at a fixed address, so `init` fails on any second attempt.
#[derive(Accounts)]
pub struct InitializeProtocol<'info> {
    #[account(
        init,
        payer = authority,
        space = ProtocolConfig::SIZE,
        seeds = [b"protocol"],
        bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    /// CHECK: Treasury account to receive protocol fees
    pub treasury: UncheckedAccount<'info>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Validates parameters and writes a fresh configuration with zeroed counters.
pub fn init_config(
    config: &mut ProtocolConfig,
    authority: Pubkey,
    treasury: Pubkey,
    dispute_threshold: u8,
    protocol_fee_bps: u16,
    min_arbiter_stake: u64,
    bump: u8,
) -> Result<()> {
    require!(
        dispute_threshold > 0,
        CoordinationError::InvalidDisputeThreshold
    );
    require!(
        protocol_fee_bps <= MAX_PROTOCOL_FEE_BPS,
        CoordinationError::InvalidProtocolFee
    );

    config.authority = authority;
    config.treasury = treasury;
    config.dispute_threshold = dispute_threshold;
    config.protocol_fee_bps = protocol_fee_bps;
    config.min_arbiter_stake = min_arbiter_stake;
    config.total_agents = 0;
    config.total_tasks = 0;
    config.completed_tasks = 0;
    config.total_value_distributed = 0;
    config.bump = bump;
    config.total_disputes = 0;
    Ok(())
}

pub fn handler(
    ctx: Context<InitializeProtocol>,
    dispute_threshold: u8,
    protocol_fee_bps: u16,
    min_arbiter_stake: u64,
) -> Result<()> {
    let authority = ctx.accounts.authority.key();
    let treasury = ctx.accounts.treasury.key();

    init_config(
        &mut ctx.accounts.protocol_config,
        authority,
        treasury,
        dispute_threshold,
        protocol_fee_bps,
        min_arbiter_stake,
        ctx.bumps.protocol_config,
    )?;

    emit!(ProtocolInitialized {
        authority,
        treasury,
        dispute_threshold,
        protocol_fee_bps,
        min_arbiter_stake,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
