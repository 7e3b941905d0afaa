pub mod channels;
pub mod flow;
pub mod mesons;
