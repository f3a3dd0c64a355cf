// Domain layer: records, tables and the ports (traits) the pipeline is built from.

pub mod model;
pub mod ports;
