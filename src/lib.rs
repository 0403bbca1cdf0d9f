//! Integration test, benchmark and demo host for the locksmith workspace.
