use tracing::{info, instrument};

use crate::size_and_align::{Align, Size};

#[derive(Debug)]
/// Describes how the interpreted machine lays out its primitive types:
/// the storage size and alignment boundary of each scalar, and the size
/// of pointers.
///
/// Every sizing decision in the interpreter (variable allocation, struct
/// member offsets, pointer arithmetic scaling, `sizeof`) goes through this
/// table, so changing it retargets the whole value model at once.
pub struct DataLayout {
    pub char_size: Size,
    pub short_size: Size,
    pub int_size: Size,
    pub long_size: Size,
    pub fp_size: Size,

    /// The size of pointers in bytes.
    pub pointer_size: Size,

    pub char_align: Align,
    pub short_align: Align,
    pub int_align: Align,
    pub long_align: Align,
    pub fp_align: Align,
    pub pointer_align: Align,

    /// The minimum alignment for aggregate types (structs and arrays).
    pub aggregate_align: Align,
}

impl Default for DataLayout {
    fn default() -> Self {
        const fn align(bytes: u64) -> Align {
            match Align::from_bytes(bytes) {
                Ok(a) => a,
                Err(_) => Align::ONE,
            }
        }

        DataLayout {
            char_size: Size::from_bytes(1),
            short_size: Size::from_bytes(2),
            int_size: Size::from_bytes(4),
            long_size: Size::from_bytes(8),
            fp_size: Size::from_bytes(8),
            pointer_size: Size::from_bytes(8),
            char_align: align(1),
            short_align: align(2),
            int_align: align(4),
            long_align: align(8),
            fp_align: align(8),
            pointer_align: align(8),
            aggregate_align: align(1),
        }
    }
}

impl DataLayout {
    #[instrument]
    pub fn new() -> Self {
        let data_layout = DataLayout::default();
        info!("DataLayout created: {:?}", data_layout);
        data_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_lp64() {
        let dl = DataLayout::default();
        assert_eq!(dl.int_size.bytes(), 4);
        assert_eq!(dl.long_size.bytes(), 8);
        assert_eq!(dl.pointer_size.bytes(), 8);
        assert_eq!(dl.long_align.bytes(), 8);
    }
}
