//! Masked bit field access for packed integer flags.
//!
//! Record and entry layouts pack several small values into one integer.
//! [`BitField`] tests and updates a masked portion of such an integer.
//! Instances are interned through [`bit_field`], a process-wide table keyed
//! by mask, so hot parsing paths can share one definition per mask.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// A masked region of a `u32` holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    mask: u32,
}

impl BitField {
    /// Create a bit field for `mask`. An empty mask yields a field that is
    /// never set.
    pub const fn new(mask: u32) -> Self {
        Self { mask }
    }

    /// True if any bit of the field is set.
    #[inline]
    pub const fn is_set(&self, holder: u32) -> bool {
        holder & self.mask != 0
    }

    /// Set or clear every bit of the field.
    #[inline]
    pub const fn set_boolean(&self, holder: u32, flag: bool) -> u32 {
        if flag {
            holder | self.mask
        } else {
            holder & !self.mask
        }
    }
}

static BIT_FIELDS: Lazy<RwLock<HashMap<u32, BitField>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Return the shared bit field for `mask`, creating it on first use.
///
/// # Examples
///
/// ```
/// use litchi_cfb::common::bitfield::bit_field;
///
/// let black = bit_field(0x01);
/// assert!(black.is_set(0x01));
/// assert_eq!(black.set_boolean(0x00, true), 0x01);
/// ```
pub fn bit_field(mask: u32) -> BitField {
    if let Some(field) = BIT_FIELDS.read().get(&mask) {
        return *field;
    }
    *BIT_FIELDS
        .write()
        .entry(mask)
        .or_insert_with(|| BitField::new(mask))
}
