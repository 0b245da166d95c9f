//! Escrow payouts and the checked lamport transfer that executes them.

use crate::errors::CoordinationError;
use anchor_lang::prelude::*;

/// Lamports leaving a task escrow as the result of one state transition.
///
/// Computed by the pure state functions and executed by the handler in the
/// same instruction, so funds never move without the matching status change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscrowPayout {
    pub to_worker: u64,
    pub to_treasury: u64,
    pub to_creator: u64,
}

impl EscrowPayout {
    pub fn refund(amount: u64) -> Self {
        Self {
            to_creator: amount,
            ..Self::default()
        }
    }

    pub fn total(&self) -> Result<u64> {
        self.to_worker
            .checked_add(self.to_treasury)
            .and_then(|sum| sum.checked_add(self.to_creator))
            .ok_or_else(|| error!(CoordinationError::ArithmeticOverflow))
    }
}

/// Transfer `amount` lamports from one account to another using checked arithmetic.
///
/// `from` must be owned by this program. Returns `Ok(())` immediately if
/// `amount == 0`.
pub fn transfer_lamports<'info>(
    from: &AccountInfo<'info>,
    to: &AccountInfo<'info>,
    amount: u64,
) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    **from.try_borrow_mut_lamports()? = from
        .lamports()
        .checked_sub(amount)
        .ok_or(CoordinationError::InsufficientEscrowBalance)?;
    **to.try_borrow_mut_lamports()? = to
        .lamports()
        .checked_add(amount)
        .ok_or(CoordinationError::ArithmeticOverflow)?;
    Ok(())
}
