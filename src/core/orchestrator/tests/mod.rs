mod restart;
mod support;
