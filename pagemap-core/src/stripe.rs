use crate::Stripe;

/// `log2(STRIPE_SIZE)`
pub const STRIPE_SHIFT: u32 = 29;

/// Width of one stripe of physical memory: 512 MiB.
pub const STRIPE_SIZE: u64 = 1 << STRIPE_SHIFT;

/// The stripe containing `physical_addr`.
///
/// Stripes are contiguous, start at physical address 0, and are numbered upwards.
pub fn classify(physical_addr: u64) -> Stripe {
    Stripe(physical_addr >> STRIPE_SHIFT)
}

impl Stripe {
    /// First physical address in this stripe.
    pub fn base(&self) -> u64 {
        self.0 << STRIPE_SHIFT
    }
}
