use shared::error::SharedError;
use shared::license::BoardIdentity;

use crate::KeygenArgs;

/// Offline activation key for a board, printed to stdout.
pub fn run(args: &KeygenArgs) -> Result<(), SharedError> {
    let key = activation_key(&args.board_id, &args.board_type)?;
    println!("{key}");
    Ok(())
}

pub(crate) fn activation_key(board_id: &str, board_type: &str) -> Result<String, SharedError> {
    let board_id = board_id.trim();
    let board_type = board_type.trim();
    if board_id.is_empty() || board_type.is_empty() {
        return Err(SharedError::Usage(
            "board id and board type are both required".into(),
        ));
    }
    if !board_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SharedError::Usage(format!(
            "board id {board_id} is not hexadecimal"
        )));
    }

    let identity = BoardIdentity::new(board_id.to_ascii_uppercase(), board_type);
    Ok(identity.expected_key())
}
