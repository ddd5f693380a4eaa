mod producer;
mod slot;
mod stress;
