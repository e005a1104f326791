//! The lead CRM: organisations, agents, leads and notifications.
//!
//! | Module       | Role                                                  |
//! |--------------|-------------------------------------------------------|
//! | `models`     | Records, timestamps and list-query types              |
//! | `scope`      | Who sees what: `Viewer` and `LeadScope`               |
//! | `forms`      | Request payloads and field validation                 |
//! | `password`   | Hashing and password rules                            |
//! | `db`         | SQLite persistence behind `DbHandle`                  |
//! | `navigation` | Next/previous over the last rendered lead list        |
//! | `session`    | Session cookies and the `CurrentUser` extractor       |
//! | `notify`     | Notifications, live push and mail after a write       |
//! | `mailer`     | Outbound mail transports                              |
//! | `ws`         | Live notification socket                              |
//! | `api`        | HTTP handlers and error mapping                       |
//! | `server`     | Router assembly and the serve loop                    |

pub mod api;
pub mod db;
pub mod forms;
pub mod mailer;
pub mod models;
pub mod navigation;
pub mod notify;
pub mod password;
pub mod scope;
pub mod server;
pub mod session;
pub mod ws;

#[cfg(test)]
pub(crate) mod testutil;
