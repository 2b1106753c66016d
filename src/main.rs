fn main() {
    lidar_graph_pipeline::cli::run();
}
