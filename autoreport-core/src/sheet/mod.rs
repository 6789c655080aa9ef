//! Spreadsheet population.

pub mod address;
pub mod writer;

pub use address::{AddressError, CellRef, RangeRef};
pub use writer::{create_workbook, plan_writes, read_cell, PlannedWrite, PopulateOutcome, SheetError, SheetWriter, WritePlan};
