//! Directory-layout scanners for the supported optical-flow datasets.
//!
//! Each scanner populates a [`FlowDataset`](crate::FlowDataset) once from a
//! fixed directory tree. The paths and file name patterns they expect are the
//! contract other tooling must follow for a dataset to be discoverable.

pub mod chairs;
pub mod hd1k;
pub mod kitti;
pub(crate) mod scan;
pub mod sintel;
pub mod things;

pub use chairs::{flying_chairs, ChairsSplit};
pub use hd1k::hd1k;
pub use kitti::{kitti, KittiSplit};
pub use sintel::{mpi_sintel, SintelPass, SintelSplit};
pub use things::{flying_things3d, pair_frames, FlowDirection, ThingsPass};
