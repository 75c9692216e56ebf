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

//! Zonesync keeps DNS zones at a hosted provider in step with zone
//! data kept locally. It offers two ways of doing so:
//!
//! * [`reconcile`] edits the records through the provider's record
//!   management interface (a [`ZoneDirectory`](reconcile::ZoneDirectory))
//!   until they match the desired set; and
//!
//! * [`coordinator`] serves the zones once over AXFR, so that the
//!   provider's secondary nameservers can pull them after the domains
//!   are registered as slave zones.

pub mod coordinator;
pub mod io;
pub mod message;
pub mod name;
pub mod reconcile;
pub mod rr;
pub mod server;
pub mod session;
mod util;
pub mod zone_file;
