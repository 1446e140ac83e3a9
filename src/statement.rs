// Statement preparation and execution for the prompt.
//
// The command surface is two keywords; anything fancier than whitespace
// splitting would be over-tooled. Each prepare failure maps to one fixed
// message the prompt prints verbatim.

use thiserror::Error;

use crate::error::Result;
use crate::row::{Row, EMAIL_MAX_LENGTH, USERNAME_MAX_LENGTH};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(Row),
    Select,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    #[error("Unrecognized keyword at start of '{0}'.")]
    Unrecognized(String),

    #[error("Syntax error. Could not parse statement.")]
    Syntax,

    #[error("String is too long.")]
    StringTooLong,

    #[error("Id out of range")]
    IdOutOfRange,
}

/// Parse one input line into a statement.
pub fn prepare(input: &str) -> std::result::Result<Statement, PrepareError> {
    let mut parts = input.split_whitespace();
    match parts.next() {
        Some("insert") => {
            let id_token = parts.next().ok_or(PrepareError::Syntax)?;
            let username = parts.next().ok_or(PrepareError::Syntax)?;
            let email = parts.next().ok_or(PrepareError::Syntax)?;
            if parts.next().is_some() {
                return Err(PrepareError::Syntax);
            }

            if username.len() > USERNAME_MAX_LENGTH || email.len() > EMAIL_MAX_LENGTH {
                return Err(PrepareError::StringTooLong);
            }

            let id: i64 = id_token.parse().map_err(|_| PrepareError::Syntax)?;
            if id < 0 || id > u32::MAX as i64 {
                return Err(PrepareError::IdOutOfRange);
            }

            Ok(Statement::Insert(Row::new(id as u32, username, email)))
        }
        Some("select") => Ok(Statement::Select),
        _ => Err(PrepareError::Unrecognized(input.to_string())),
    }
}

/// Run a statement against the table. Selects return the matching rows;
/// inserts return an empty list.
pub fn execute(statement: Statement, table: &mut Table) -> Result<Vec<Row>> {
    match statement {
        Statement::Insert(row) => {
            table.insert(&row)?;
            Ok(Vec::new())
        }
        Statement::Select => table.select(),
    }
}
