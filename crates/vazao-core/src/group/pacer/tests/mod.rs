use super::*;
use crate::config::{ConfigUpdate, ThrottleConfig};
use crate::error::{ConfigError, ThrottleError};
use crate::group::command::ThrottleOptions;

use std::time::{Duration, Instant};

use bytes::Bytes;

mod common;
use common::*;

mod lifecycle;
