//! The fixed region-class enumeration.

/// Total number of region classes, including `VoidSpace`.
pub const NUMBER_OF_REGIONS: usize = 7;

/// A semantic label assigned to each map cell.
///
/// `VoidSpace` is pinned to a likelihood of 0 everywhere; the remaining six
/// classes share a probability vector supplied externally each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum RegionClass {
    VoidSpace = 0,
    Hallway = 1,
    Staircase = 2,
    Elevator = 3,
    Door = 4,
    SittingArea = 5,
    StandingArea = 6,
}

impl RegionClass {
    /// Maps a raw region id as stored in the map file to a `RegionClass`.
    ///
    /// Returns `None` for ids outside `0..NUMBER_OF_REGIONS`; the caller decides
    /// whether that is a format error (map loading) or should just be ignored.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Self::VoidSpace),
            1 => Some(Self::Hallway),
            2 => Some(Self::Staircase),
            3 => Some(Self::Elevator),
            4 => Some(Self::Door),
            5 => Some(Self::SittingArea),
            6 => Some(Self::StandingArea),
            _ => None,
        }
    }
}
