mod semantic;
mod web;
