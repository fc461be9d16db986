//! Resource scanner: walks every enabled (type, region) pair and classifies
//! what each lister returns.

pub mod pipeline;
