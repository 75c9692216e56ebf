// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

mod args;
mod config;
mod run;
mod serve;
mod snapshot;
mod sync;
mod zones;

use args::Command;

fn main() {
    match args::parse().command {
        Command::Serve(serve_args) => run::run(|| serve::serve(serve_args)),
        Command::Sync(sync_args) => run::run(|| sync::sync(sync_args)),
    }
}
