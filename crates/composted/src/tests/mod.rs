//! Behavioural suites for the server bootstrap, session, and process.

mod support;
