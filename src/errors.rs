// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::error;
use std::result;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Codec(err: serde_json::Error) {
            from()
            cause(err)
            display("config codec: {}", err)
        }
        Config(msg: String) {
            display("invalid configuration: {}", msg)
        }
        UnknownSchedulerType(tp: String) {
            display("unknown scheduler type {:?}", tp)
        }
        SchedulerArgs(tp: String) {
            display("missing arguments for scheduler type {:?}", tp)
        }
        ParseOperatorKind(token: String) {
            display("invalid operator kind token {:?}", token)
        }
        Other(err: Box<dyn error::Error + Sync + Send>) {
            from()
            cause(err.as_ref())
            display("unknown error {:?}", err)
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
