mod common;
mod qa;
