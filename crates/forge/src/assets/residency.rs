//! One-way residency state machine for textures and samplers (§4.8).
//!
//! Transitions are driven by the asset manager, one tick at a time:
//! `NonResident → StreamRequest → Resident → EvictRequest → NonResident`.
//! The FSM itself only tracks state and the descriptor index; ordering the
//! transitions relative to frame fences is the caller's responsibility.

use crate::error::{Error, Result};

/// Residency state of a streamed asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidencyState {
    /// No GPU resources allocated.
    NonResident,
    /// Streaming has been requested; a descriptor is reserved.
    StreamRequest,
    /// Fully resident and safe to sample.
    Resident,
    /// Eviction has been requested but not yet completed.
    EvictRequest,
}

/// Allocates and frees descriptor indices for resident assets.
pub trait DescriptorAllocator {
    /// Allocates a new, nonzero descriptor index.
    fn allocate(&mut self) -> u32;
    /// Frees a previously allocated descriptor index.
    fn free(&mut self, descriptor: u32);
}

/// Residency state machine for one texture or sampler asset.
///
/// Invariant: `descriptor() == 0` outside [`ResidencyState::Resident`] and
/// [`ResidencyState::StreamRequest`].
pub struct AssetResidency {
    state: ResidencyState,
    descriptor: u32,
}

impl Default for AssetResidency {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetResidency {
    /// Creates a residency tracker starting in [`ResidencyState::NonResident`].
    pub fn new() -> Self {
        Self { state: ResidencyState::NonResident, descriptor: 0 }
    }

    /// Current state.
    pub fn state(&self) -> ResidencyState {
        self.state
    }

    /// Current descriptor index, or `0` if none is reserved.
    pub fn descriptor(&self) -> u32 {
        self.descriptor
    }

    /// `NonResident → StreamRequest`, reserving a descriptor.
    pub fn request_stream(&mut self, allocator: &mut impl DescriptorAllocator) -> Result<()> {
        if self.state != ResidencyState::NonResident {
            return Err(Error::InvalidArgument(format!(
                "cannot request streaming from state {:?}",
                self.state
            )));
        }
        self.descriptor = allocator.allocate();
        self.state = ResidencyState::StreamRequest;
        Ok(())
    }

    /// `StreamRequest → Resident`.
    pub fn make_resident(&mut self) -> Result<()> {
        if self.state != ResidencyState::StreamRequest {
            return Err(Error::InvalidArgument(format!(
                "cannot become resident from state {:?}",
                self.state
            )));
        }
        self.state = ResidencyState::Resident;
        Ok(())
    }

    /// `Resident → EvictRequest`.
    pub fn request_eviction(&mut self) -> Result<()> {
        if self.state != ResidencyState::Resident {
            return Err(Error::InvalidArgument(format!(
                "cannot request eviction from state {:?}",
                self.state
            )));
        }
        self.state = ResidencyState::EvictRequest;
        Ok(())
    }

    /// `EvictRequest → NonResident`, freeing the descriptor.
    pub fn evict(&mut self, allocator: &mut impl DescriptorAllocator) -> Result<()> {
        if self.state != ResidencyState::EvictRequest {
            return Err(Error::InvalidArgument(format!(
                "cannot evict from state {:?}",
                self.state
            )));
        }
        if self.descriptor != 0 {
            allocator.free(self.descriptor);
            self.descriptor = 0;
        }
        self.state = ResidencyState::NonResident;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingAllocator {
        next: u32,
    }

    impl DescriptorAllocator for CountingAllocator {
        fn allocate(&mut self) -> u32 {
            self.next += 1;
            self.next
        }
        fn free(&mut self, _descriptor: u32) {}
    }

    #[test]
    fn full_lifecycle_clears_descriptor_on_evict() {
        let mut allocator = CountingAllocator { next: 0 };
        let mut asset = AssetResidency::new();

        assert_eq!(asset.descriptor(), 0);
        asset.request_stream(&mut allocator).unwrap();
        assert_eq!(asset.state(), ResidencyState::StreamRequest);
        assert_ne!(asset.descriptor(), 0);

        asset.make_resident().unwrap();
        assert_eq!(asset.state(), ResidencyState::Resident);

        asset.request_eviction().unwrap();
        assert_eq!(asset.state(), ResidencyState::EvictRequest);

        asset.evict(&mut allocator).unwrap();
        assert_eq!(asset.state(), ResidencyState::NonResident);
        assert_eq!(asset.descriptor(), 0);
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let mut allocator = CountingAllocator { next: 0 };
        let mut asset = AssetResidency::new();
        assert!(asset.make_resident().is_err());
        assert!(asset.request_eviction().is_err());
        assert!(asset.evict(&mut allocator).is_err());
    }
}
