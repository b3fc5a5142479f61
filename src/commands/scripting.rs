//! `EVAL script numkeys [key ...] [arg ...]`

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::scripting::ScriptBridge;
use crate::storage::Database;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::write("eval", Arity::AtLeast(2), eval).no_script());
}

fn eval(db: &Database, req: &Request<'_>) -> CommandResult {
    let script = String::from_utf8_lossy(req.param(0)?);
    let numkeys = req.param_i64(1)?;
    let rest = req.params_from(2);

    let numkeys = usize::try_from(numkeys)
        .map_err(|_| CommandError::OutOfRange("Number of keys can't be negative"))?;
    if numkeys > rest.len() {
        return Err(CommandError::OutOfRange(
            "Number of keys can't be greater than number of args",
        ));
    }
    let (keys, argv) = rest.split_at(numkeys);

    ScriptBridge::new(db, req.session(), req.context()).eval(&script, keys, argv)
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::test_support::*;
    use crate::error::CommandError;
    use crate::protocol::RespValue;

    #[test]
    fn test_eval_round_trip() {
        let h = Harness::new();
        assert_eq!(
            h.run(&[
                "EVAL",
                "redis.call('set', KEYS[1], ARGV[1]); return redis.call('get', KEYS[1])",
                "1",
                "greeting",
                "hello",
            ]),
            bulk("hello")
        );
        assert_eq!(h.run(&["GET", "greeting"]), bulk("hello"));
        assert_eq!(
            h.run(&["EVAL", "return redis.call('incr', 'missing')", "0"]),
            RespValue::integer(1)
        );
    }

    #[test]
    fn test_eval_uses_selected_database() {
        let h = Harness::new();
        h.run(&["SELECT", "2"]);
        h.run(&["EVAL", "return redis.call('set', 'k', 'v')", "0"]);
        assert_eq!(h.run(&["GET", "k"]), bulk("v"));
        h.run(&["SELECT", "0"]);
        assert_eq!(h.run(&["GET", "k"]), RespValue::Null);
    }

    #[test]
    fn test_eval_numkeys_validation() {
        let h = Harness::new();
        assert_eq!(
            h.run(&["EVAL", "return 1", "2", "only-one"]),
            err(CommandError::OutOfRange(
                "Number of keys can't be greater than number of args"
            ))
        );
        assert_eq!(
            h.run(&["EVAL", "return 1", "-1"]),
            err(CommandError::OutOfRange("Number of keys can't be negative"))
        );
        assert_eq!(
            h.run(&["EVAL", "return 1", "x"]),
            err(CommandError::NotAnInteger)
        );
    }

    #[test]
    fn test_eval_cannot_nest() {
        let h = Harness::new();
        assert_eq!(
            h.run(&["EVAL", "return redis.call('eval', 'return 1', '0')", "0"]),
            err(CommandError::Script(CommandError::NotAllowedFromScript.to_string()))
        );
    }

    #[test]
    fn test_eval_rejected_on_replica() {
        let h = Harness::read_only();
        assert_eq!(
            h.run(&["EVAL", "return 1", "0"]),
            err(CommandError::ReadOnly)
        );
    }
}
