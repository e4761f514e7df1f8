pub mod align;
pub mod chart;
pub mod export;
pub mod histogram;
pub mod memo;
pub mod normalize;
pub mod samples;
pub mod smoothing;
pub mod trace_look;
pub mod traces;
