//! Options controlling how containers are opened and created.

use serde::{Deserialize, Serialize};

use super::header::SectorSize;

/// Open and create options
///
/// # Examples
///
/// ```
/// use litchi_cfb::ole::{OleOptions, SectorSize};
///
/// let options = OleOptions::new()
///     .with_sector_size(SectorSize::Large)
///     .with_verify_streams_on_open(true);
/// assert_eq!(options.sector_size, SectorSize::Large);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OleOptions {
    /// Sector size for newly created containers
    pub sector_size: SectorSize,
    /// Walk every stream chain at open time and fail on the first broken one
    pub verify_streams_on_open: bool,
    /// Class id stored in the root entry of newly created containers
    pub root_clsid: Option<[u8; 16]>,
}

impl OleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sector_size(mut self, sector_size: SectorSize) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn with_verify_streams_on_open(mut self, verify: bool) -> Self {
        self.verify_streams_on_open = verify;
        self
    }

    pub fn with_root_clsid(mut self, clsid: [u8; 16]) -> Self {
        self.root_clsid = Some(clsid);
        self
    }
}
