pub mod ensemble;
pub mod run;
pub mod scan;
