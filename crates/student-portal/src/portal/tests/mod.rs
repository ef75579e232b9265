mod common;
mod registration;
mod routing;
