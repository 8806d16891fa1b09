//! Flow routing
//!
//! - Flow direction: D8 single flow direction
//! - Flow accumulation: upstream cell count, weighted accumulation and
//!   upslope contributing area per unit width

mod flow_accumulation;
mod flow_direction;

pub use flow_accumulation::{
    flow_accumulation, upslope_area, weighted_flow_accumulation, FlowAccumulation,
};
pub use flow_direction::{downstream, flow_direction, FlowDirection, NO_FLOW_DATA};
