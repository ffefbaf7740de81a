// Hardware drivers: chip-level, board-independent.
//
// Pin assignments and bus wiring live in board/.

pub mod st7789;
