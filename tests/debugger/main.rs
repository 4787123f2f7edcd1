mod common;

mod session;
mod trace;
mod watch;
