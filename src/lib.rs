pub mod sync;

pub mod prelude {
    pub use crate::sync::barrier::{Barrier, BarrierWaitResult};
    pub use crate::sync::broadcast as shared_broadcast;
    pub use crate::sync::error::RunError;
    pub use crate::sync::single_flight;
    pub use crate::sync::single_flight::Group as SingleFlightGroup;
}
