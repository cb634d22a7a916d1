pub mod beacon_state;
pub mod consts;
pub mod containers;
pub mod primitives;
