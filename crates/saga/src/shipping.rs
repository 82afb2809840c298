//! Shipping allocation.
//!
//! No carrier API is involved: allocation mints a synthetic tracking
//! number `{carrier code}{epoch ms}{3 random digits}` for a randomly
//! chosen carrier and estimates delivery 3 to 5 days out.

use std::sync::Arc;

use chrono::Duration;
use common::Clock;
use domain::{Carrier, ShippingAllocation};
use rand::Rng;

/// Mints tracking numbers and delivery estimates.
#[derive(Clone)]
pub struct ShippingAllocator {
    clock: Arc<dyn Clock>,
}

impl ShippingAllocator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Allocates a carrier, tracking number, and delivery estimate.
    pub fn allocate(&self) -> ShippingAllocation {
        let mut rng = rand::thread_rng();
        let carrier = Carrier::ALL[rng.gen_range(0..Carrier::ALL.len())];
        let now = self.clock.now();
        let suffix: u32 = rng.gen_range(0..1000);
        let tracking_number = format!("{}{}{suffix:03}", carrier.code(), now.timestamp_millis());
        let estimated_delivery = now.date_naive() + Duration::days(rng.gen_range(3..=5));

        ShippingAllocation { tracking_number, carrier, estimated_delivery }
    }
}
