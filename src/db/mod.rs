pub mod omie;
