//! Legacy spreadsheet document generation.
//!
//! Three layers, each oblivious to the one above it:
//!
//! - [`biff`]: BIFF8 record emitters for the workbook stream
//! - [`cfb`]: the OLE2 compound file container
//! - [`props`]: SummaryInformation property set streams
//!
//! [`builder::DocumentBuilder`] ties them together and is the only
//! entry point the export facade needs.

pub mod biff;
pub mod builder;
pub mod cfb;
pub mod props;

pub use builder::DocumentBuilder;
