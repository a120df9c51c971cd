//! Bot commands.

mod play;
mod queue;
mod skip;
mod stop;
mod volume;

use crate::{CadenceError, Data};

/// Convenient type alias for [poise::Command].
pub type Command = poise::Command<Data, CadenceError>;

/// Lists all the implemented commands
pub fn list() -> Vec<Command> {
    vec![
        play::play(),
        skip::skip(),
        stop::stop(),
        queue::queue(),
        volume::volume(),
    ]
}
