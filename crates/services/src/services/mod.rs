pub mod chatbot;
pub mod cluster;
pub mod cpuavail;
pub mod groups;
pub mod jobs;
pub mod layouts;
pub mod projects;
pub mod quota;
pub mod requests;
pub mod scontrol;
pub mod sinfo;
pub mod table;
pub mod utilization;
pub mod venv;
