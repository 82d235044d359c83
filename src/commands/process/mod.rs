mod archive;
mod outputs;
mod run;
#[cfg(test)]
mod tests;
mod tokens;

pub use run::run;
