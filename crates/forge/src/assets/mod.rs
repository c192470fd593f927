//! Asset residency lifecycle (§4.8).

mod residency;

pub use residency::{AssetResidency, DescriptorAllocator, ResidencyState};
