pub mod backend;
pub mod controller;
pub mod demo;
pub mod domain;
pub mod inputter;
pub mod loader;
pub mod model;
pub mod parser;
pub mod rows;
pub mod serializer;
pub mod state;
pub mod table;
pub mod ui;
pub mod value;
pub mod view;
pub mod workflow;
