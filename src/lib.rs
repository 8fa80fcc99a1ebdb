/*!
# GU-TAP

A workflow dashboard for a university technical-assistance (TA) program, built in Rust.

## Overview

External requesters submit TA requests through a public form. Coordinators triage the
queue, assign requests to staff coaches and transfer them between coaches. Coaches log
interactions and deliveries, comment and mark their requests completed. Two smaller
workflows run alongside: student-support requests routed to research assistants by
weekly availability, and travel authorization forms rendered to PDF and signed off by
two approvers.

## Architecture

### Web Layer
- **Technologies**: axum, handlebars, cookie sessions
- Role-gated pages for coordinators, staff and research assistants; the request form
  needs no login
- JSON endpoints for tickets, metrics, worksheet export and travel submission

### Service Layer
- One `Tap` service shared by every handler
- Each write is a read-modify-write of a single worksheet, serialized by a lock
- Notifications are sent after the write; their failures become warnings

### Data Layer
- Worksheets are header row + string rows, rewritten whole
- Typed records map to columns through serde
- Gzip + bincode workbook on disk, an in-memory workbook, and a read cache in front

## Modules

- **sheet**: Worksheet tables and typed records
- **saving**: Table persistence with compression
- **store**: Sheet store trait, local and in-memory workbooks, read cache
- **validation**: Email and phone checks, violation lists
- **ticket**: TA requests and their lifecycle
- **logs**: Interaction and delivery logs
- **ga**: Student-support availability matching
- **travel**: Travel forms, GSA per diem, dual approval, report layout and PDF
- **dashboard**: Metrics, filters and queues
- **files**: Attachment storage
- **mailer**: Outgoing email
- **notify**: Notification texts
- **login**: Users, password hashing and sessions
- **config**: Environment configuration
- **downloader**: Export functionality (CSV, XLSX)
- **service**: The shared service layer
- **app**: Routing and handlers
*/

pub mod dashboard;
pub mod ga;
pub mod logs;
pub mod saving;
pub mod sheet;
pub mod store;
pub mod ticket;
pub mod travel;
pub mod validation;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod files;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod mailer;
#[cfg(feature = "web")]
pub mod notify;
#[cfg(feature = "web")]
pub mod service;

pub use sheet::{SheetRecord, Table};
pub use store::{CachedStore, LocalWorkbook, MemoryWorkbook, SheetStore, StoreError};
pub use ticket::{Priority, Status, TaRequest};

#[cfg(feature = "web")]
pub use error::AppError;
#[cfg(feature = "web")]
pub use service::Tap;
