mod basics;
mod busy;
