mod adapter;
mod stack;
