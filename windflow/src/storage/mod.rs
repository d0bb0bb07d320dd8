pub mod keyed_state;
