//! Connection commands.

use super::{arity, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::Reply;
use crate::storage::Db;
use bytes::Bytes;

pub(super) fn register(table: &mut CommandTable) {
    table.register("ping", ping);
    table.register("echo", echo);
}

/// PING [message]
pub fn ping(_db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    match args {
        [] => Ok(Reply::pong()),
        [message] => Ok(Reply::bulk(message.clone())),
        _ => Err(CommandError::WrongArity("ping")),
    }
}

/// ECHO message
pub fn echo(_db: &Db, args: &[Bytes]) -> CommandResult<Reply> {
    arity(args, 1, "echo")?;
    Ok(Reply::bulk(args[0].clone()))
}
