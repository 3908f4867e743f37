use serde::{Deserialize, Serialize};

/// Amounts are whole rupees. Settlement is exact equality, so the ledger
/// stays in integer arithmetic throughout.
pub const TOTAL_FEE: i64 = 60_000;
pub const MAX_INSTALLMENT_LIMIT: i64 = 50_000;

/// Grace period before the portal navigates away from a settled payment page.
pub const REDIRECT_GRACE_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentMode {
    /// Pay off everything remaining in one charge.
    Full,
    /// Pay up to the per-transaction ceiling.
    Part,
}

impl InstallmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InstallmentMode::Full => "full",
            InstallmentMode::Part => "part",
        }
    }

    pub fn parse(s: &str) -> Option<InstallmentMode> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Some(InstallmentMode::Full),
            "part" => Some(InstallmentMode::Part),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The charge would push the paid amount past the total fee.
    Overpayment {
        paid: i64,
        charge: i64,
        total_fee: i64,
    },
}

impl LedgerError {
    pub fn message(&self) -> String {
        match self {
            LedgerError::Overpayment {
                paid,
                charge,
                total_fee,
            } => format!(
                "charge of {} would exceed total fee ({} already paid of {})",
                charge, paid, total_fee
            ),
        }
    }
}

/// Next charge for the given mode. `full` clears the remaining balance;
/// `part` is capped by the per-transaction ceiling.
pub fn compute_charge(
    mode: InstallmentMode,
    paid_amount: i64,
    total_fee: i64,
    max_installment_limit: i64,
) -> i64 {
    let remaining = total_fee - paid_amount;
    match mode {
        InstallmentMode::Full => remaining,
        InstallmentMode::Part => remaining.min(max_installment_limit),
    }
}

/// Applies a charge, guarding the `0 <= paid <= total_fee` invariant.
/// On `Overpayment` the caller's paid amount must remain untouched.
pub fn apply_charge(paid_amount: i64, charge: i64, total_fee: i64) -> Result<i64, LedgerError> {
    let new_paid = paid_amount + charge;
    if new_paid > total_fee {
        return Err(LedgerError::Overpayment {
            paid: paid_amount,
            charge,
            total_fee,
        });
    }
    Ok(new_paid)
}

pub fn is_settled(paid_amount: i64, total_fee: i64) -> bool {
    paid_amount == total_fee
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub charge: i64,
    pub paid_amount: i64,
    pub balance: i64,
    pub settled: bool,
    /// True only on the charge that reached settlement; the caller schedules
    /// the navigation-away exactly once off this flag.
    pub redirect_scheduled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayError {
    Ledger(LedgerError),
    AlreadySettled,
}

/// Per-session fee ledger. Created fresh for each payment-page session and
/// never persisted; the paid amount only moves through `pay`.
#[derive(Debug, Clone)]
pub struct FeeLedger {
    pub total_fee: i64,
    pub paid_amount: i64,
    pub mode: InstallmentMode,
    pub max_installment_limit: i64,
    redirect_scheduled: bool,
}

impl FeeLedger {
    pub fn new(total_fee: i64, max_installment_limit: i64) -> Self {
        FeeLedger {
            total_fee,
            paid_amount: 0,
            mode: InstallmentMode::Full,
            max_installment_limit,
            redirect_scheduled: false,
        }
    }

    pub fn select_mode(&mut self, mode: InstallmentMode) {
        self.mode = mode;
    }

    pub fn next_charge(&self) -> i64 {
        compute_charge(
            self.mode,
            self.paid_amount,
            self.total_fee,
            self.max_installment_limit,
        )
    }

    pub fn is_settled(&self) -> bool {
        is_settled(self.paid_amount, self.total_fee)
    }

    /// One "pay" action: compute the bounded charge for the selected mode and
    /// apply it. On failure the ledger is left untouched.
    pub fn pay(&mut self) -> Result<ChargeOutcome, PayError> {
        if self.is_settled() {
            return Err(PayError::AlreadySettled);
        }
        let charge = self.next_charge();
        let new_paid =
            apply_charge(self.paid_amount, charge, self.total_fee).map_err(PayError::Ledger)?;
        self.paid_amount = new_paid;

        let settled = self.is_settled();
        let schedule = settled && !self.redirect_scheduled;
        if schedule {
            self.redirect_scheduled = true;
        }
        Ok(ChargeOutcome {
            charge,
            paid_amount: new_paid,
            balance: self.total_fee - new_paid,
            settled,
            redirect_scheduled: schedule,
        })
    }
}
