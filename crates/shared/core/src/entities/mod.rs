mod account;
mod fee;
mod order;
mod position;
mod side;

pub use account::AccountBalance;
pub use fee::FeeSchedule;
pub use order::{OpenOrder, OrderId, OrderInstruction, OrderKind};
pub use position::Position;
pub use side::{PositionSide, Side};
